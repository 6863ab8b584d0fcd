use std::f32::consts::{FRAC_PI_2, PI};

use benchconfig::PolygonSampling;
use bytemuck::{Pod, Zeroable};

/// First person camera as stored in quicksaves.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Camera {
    pub position_world_space: [f32; 3],
    pub rotation_x: f32,
    pub rotation_z: f32,
    pub vertical_fov: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position_world_space: [-3.0, -2.0, 1.65],
            rotation_x: 0.43 * PI,
            rotation_z: 1.3 * PI,
            vertical_fov: 0.33 * PI,
            near: 0.05,
            far: 1.0e3,
            speed: 2.0,
        }
    }
}

/// How a polygonal light's emission is modulated by its texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Texturing {
    #[default]
    None,
    /// Plane-space coordinates index the texture.
    Area,
    /// The flipped outgoing direction indexes a light probe.
    Portal,
    /// A 1D texture is interpreted as an IES profile.
    IesProfile,
}

impl Texturing {
    pub fn code(self) -> u32 {
        match self {
            Texturing::None => 0,
            Texturing::Area => 1,
            Texturing::Portal => 2,
            Texturing::IesProfile => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Texturing::None),
            1 => Some(Texturing::Area),
            2 => Some(Texturing::Portal),
            3 => Some(Texturing::IesProfile),
            _ => None,
        }
    }
}

/// Fixed-size per-light block of the quicksave format.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightHeader {
    pub rotation_angles: [f32; 3],
    pub scaling_x: f32,
    pub translation: [f32; 3],
    pub scaling_y: f32,
    pub radiant_flux: [f32; 3],
    pub inv_scaling_x: f32,
    pub surface_radiance: [f32; 3],
    pub inv_scaling_y: f32,
    pub plane: [f32; 4],
    pub vertex_count: u32,
    pub texturing: u32,
}

/// A convex planar polygon emitting light, placed in the world by Euler
/// rotation, per-axis scaling and translation.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonalLight {
    pub header: LightHeader,
    pub texture_path: Option<String>,
    /// Plane-space vertices; `x` and `y` are used, `z` and `w` are padding.
    pub vertices: Vec<[f32; 4]>,
}

impl Default for PolygonalLight {
    /// Unit square standing upright at the origin.
    fn default() -> Self {
        let mut light = Self {
            header: LightHeader {
                rotation_angles: [FRAC_PI_2, 0.0, 0.0],
                scaling_x: 1.0,
                scaling_y: 1.0,
                radiant_flux: [1.0; 3],
                ..LightHeader::zeroed()
            },
            texture_path: None,
            vertices: vec![
                [0.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
            ],
        };
        light.update();
        light
    }
}

impl PolygonalLight {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn texturing(&self) -> Texturing {
        Texturing::from_code(self.header.texturing).unwrap_or_default()
    }

    /// Rotation matrix rows, applying z then y then x.
    pub fn rotation(&self) -> [[f32; 3]; 3] {
        let [ax, ay, az] = self.header.rotation_angles;
        let (sx, cx) = ax.sin_cos();
        let (sy, cy) = ay.sin_cos();
        let (sz, cz) = az.sin_cos();
        let cxsy = cx * sy;
        let sxsy = sx * sy;
        [
            [cy * cz, -cy * sz, -sy],
            [-sxsy * cz + cx * sz, sxsy * sz + cx * cz, -sx * cy],
            [cxsy * cz + sx * sz, -cxsy * sz + sx * cz, cx * cy],
        ]
    }

    pub fn world_space_vertices(&self) -> Vec<[f32; 3]> {
        let rotation = self.rotation();
        let scalings = [self.header.scaling_x, self.header.scaling_y];
        self.vertices
            .iter()
            .map(|vertex| {
                let mut out = self.header.translation;
                for (j, component) in out.iter_mut().enumerate() {
                    for k in 0..2 {
                        *component += scalings[k] * rotation[j][k] * vertex[k];
                    }
                }
                out
            })
            .collect()
    }

    /// Signed plane-space area of the fan triangulation, scaled to world
    /// units.
    pub fn signed_area(&self) -> f32 {
        let Some(origin) = self.vertices.first() else {
            return 0.0;
        };
        let mut area = 0.0;
        for pair in self.vertices[1..].windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let e1 = [b[0] - origin[0], b[1] - origin[1]];
            let e2 = [a[0] - origin[0], a[1] - origin[1]];
            area += 0.5 * (e1[0] * e2[1] - e2[0] * e1[1]);
        }
        area * self.header.scaling_x * self.header.scaling_y
    }

    /// Recomputes the derived header fields: inverse scalings, plane and
    /// surface radiance.
    pub fn update(&mut self) {
        self.header.vertex_count = self.vertices.len() as u32;
        self.header.inv_scaling_x = 1.0 / self.header.scaling_x;
        self.header.inv_scaling_y = 1.0 / self.header.scaling_y;
        let rotation = self.rotation();
        let normal = [rotation[0][2], rotation[1][2], rotation[2][2]];
        let t = self.header.translation;
        let offset = -(normal[0] * t[0] + normal[1] * t[1] + normal[2] * t[2]);
        let sign = if self.signed_area() > 0.0 { 1.0 } else { -1.0 };
        self.header.plane = [
            sign * normal[0],
            sign * normal[1],
            sign * normal[2],
            sign * offset,
        ];
        self.header.surface_radiance = self.header.radiant_flux;
    }
}

/// Camera and lights of the current scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub camera: Camera,
    pub lights: Vec<PolygonalLight>,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            lights: vec![PolygonalLight::default()],
        }
    }
}

impl SceneState {
    /// Fewest vertices of any light, or 3 when there are no lights.
    pub fn min_light_vertex_count(&self) -> usize {
        self.lights
            .iter()
            .map(PolygonalLight::vertex_count)
            .min()
            .unwrap_or(3)
    }

    /// Most vertices of any light, never less than 3.
    pub fn max_light_vertex_count(&self) -> usize {
        self.lights
            .iter()
            .map(PolygonalLight::vertex_count)
            .fold(3, usize::max)
    }

    /// Largest polygon the shading stage may see after clipping a light
    /// against the shading point's horizon.
    pub fn max_polygon_vertex_count(&self, technique: PolygonSampling) -> usize {
        let lights = self.max_light_vertex_count();
        match technique {
            PolygonSampling::LtcCp => lights + 1,
            _ => lights,
        }
    }

    /// Preprocessor definitions derived from the light set.
    pub fn shader_defines(&self, technique: PolygonSampling) -> Vec<(String, String)> {
        vec![
            ("POLYGONAL_LIGHT_COUNT".into(), self.lights.len().to_string()),
            (
                "MIN_POLYGONAL_LIGHT_VERTEX_COUNT".into(),
                self.min_light_vertex_count().to_string(),
            ),
            (
                "MAX_POLYGONAL_LIGHT_VERTEX_COUNT".into(),
                self.max_light_vertex_count().to_string(),
            ),
            (
                "MAX_POLYGON_VERTEX_COUNT".into(),
                self.max_polygon_vertex_count(technique).to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_have_the_quicksave_sizes() {
        assert_eq!(std::mem::size_of::<LightHeader>(), 88);
        assert_eq!(std::mem::size_of::<Camera>(), 36);
    }

    #[test]
    fn default_light_is_upright_unit_square() {
        let light = PolygonalLight::default();
        assert_eq!(light.header.vertex_count, 4);
        assert!((light.signed_area().abs() - 1.0).abs() < 1e-6);
        let world = light.world_space_vertices();
        // Rotated a quarter turn about x: plane-space y maps onto world z.
        assert!((world[2][0] - 1.0).abs() < 1e-6);
        assert!((world[2][2] - 1.0).abs() < 1e-6);
        assert!(world[2][1].abs() < 1e-6);
    }

    #[test]
    fn vertex_count_bounds() {
        let mut scene = SceneState::default();
        assert_eq!(scene.max_light_vertex_count(), 4);
        assert_eq!(scene.max_polygon_vertex_count(PolygonSampling::LtcCp), 5);
        assert_eq!(scene.max_polygon_vertex_count(PolygonSampling::AreaTurk), 4);
        scene.lights.clear();
        assert_eq!(scene.min_light_vertex_count(), 3);
        assert_eq!(scene.max_light_vertex_count(), 3);
    }

    #[test]
    fn plane_flips_with_winding() {
        let mut light = PolygonalLight::default();
        let plane = light.header.plane;
        light.vertices.reverse();
        light.update();
        for (a, b) in plane.iter().zip(light.header.plane) {
            assert!((a + b).abs() < 1e-6);
        }
    }
}
