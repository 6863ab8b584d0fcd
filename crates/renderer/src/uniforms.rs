use benchconfig::RenderSettings;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use orchestrator::{Camera, CaptureByte};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tables::NOISE_LAYER_COUNT;

/// Per-slot constants shared by every stage. Layout matches
/// `shaders/constants.glsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct FrameConstants {
    pub world_to_projection_space: [[f32; 4]; 4],
    pub projection_to_world_space: [[f32; 4]; 4],
    pub camera_position_world_space: [f32; 4],
    pub viewport: [f32; 4],
    pub factors: [f32; 4],
    pub counts: [u32; 4],
    pub noise_random: [u32; 4],
}

pub(crate) struct FrameInputs<'a> {
    pub camera: &'a Camera,
    pub extent: (u32, u32),
    pub settings: &'a RenderSettings,
    pub sample_count: u32,
    /// Weight of the current shading estimate in the running average.
    pub blend_weight: f32,
    pub capture_byte: CaptureByte,
    pub light_count: usize,
    pub noise_random: [u32; 4],
}

impl FrameConstants {
    pub fn new(inputs: &FrameInputs<'_>) -> Self {
        let (width, height) = (inputs.extent.0.max(1) as f32, inputs.extent.1.max(1) as f32);
        let world_to_projection = world_to_projection_space(inputs.camera, width / height);
        let [x, y, z] = inputs.camera.position_world_space;
        Self {
            world_to_projection_space: world_to_projection.to_cols_array_2d(),
            projection_to_world_space: world_to_projection.inverse().to_cols_array_2d(),
            camera_position_world_space: [x, y, z, 1.0],
            viewport: [width, height, 1.0 / width, 1.0 / height],
            factors: [
                inputs.settings.exposure_factor,
                inputs.settings.roughness_factor,
                inputs.settings.mis_visibility_estimate,
                inputs.blend_weight,
            ],
            counts: [
                inputs.sample_count,
                inputs.capture_byte.code(),
                inputs.light_count as u32,
                inputs.noise_random[0] % NOISE_LAYER_COUNT,
            ],
            noise_random: inputs.noise_random,
        }
    }
}

/// Rigid transform from world space into the camera's view space. The
/// camera turns about its x-axis first, then about the world z-axis.
pub(crate) fn world_to_view_space(camera: &Camera) -> Mat4 {
    let (sin_x, cos_x) = camera.rotation_x.sin_cos();
    let (sin_z, cos_z) = camera.rotation_z.sin_cos();
    let rotation_x = Mat3::from_cols(
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, cos_x, -sin_x),
        Vec3::new(0.0, sin_x, cos_x),
    );
    let rotation_z = Mat3::from_cols(
        Vec3::new(cos_z, -sin_z, 0.0),
        Vec3::new(sin_z, cos_z, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    );
    let view_to_world = rotation_z * rotation_x;
    let world_to_view = view_to_world.transpose();
    let position = Vec3::from_array(camera.position_world_space);
    Mat4::from_translation(-(world_to_view * position)) * Mat4::from_mat3(world_to_view)
}

/// View space has x pointing left and y pointing down on screen; the view
/// direction is -z.
pub(crate) fn world_to_projection_space(camera: &Camera, aspect_ratio: f32) -> Mat4 {
    let projection = Mat4::perspective_rh(camera.vertical_fov, aspect_ratio, camera.near, camera.far);
    let flip = Mat4::from_scale(Vec3::new(-1.0, -1.0, 1.0));
    projection * flip * world_to_view_space(camera)
}

/// One uniform buffer per frame slot, so a slot's constants are only
/// rewritten once its previous frame has completed.
pub(crate) struct ConstantBuffers {
    pub buffers: Vec<wgpu::Buffer>,
}

impl ConstantBuffers {
    pub fn new(device: &wgpu::Device, slot_count: usize) -> Self {
        let buffers = (0..slot_count)
            .map(|_| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("frame constants"),
                    size: std::mem::size_of::<FrameConstants>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        Self { buffers }
    }

    pub fn write(&self, queue: &wgpu::Queue, slot: usize, constants: &FrameConstants) {
        if let Some(buffer) = self.buffers.get(slot) {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(constants));
        }
    }
}

/// Four random words per frame for decorrelating the noise table.
pub(crate) struct NoiseRandomizer {
    rng: StdRng,
}

impl NoiseRandomizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fresh numbers when animating, otherwise a fixed pattern.
    pub fn next(&mut self, animate: bool) -> [u32; 4] {
        if animate {
            self.rng.gen()
        } else {
            [0; 4]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_glsl_layout() {
        assert_eq!(std::mem::size_of::<FrameConstants>(), 208);
    }

    #[test]
    fn point_ahead_of_camera_lands_mid_screen() {
        let camera = Camera::default();
        let view_to_world = world_to_view_space(&camera).inverse();
        let ahead = view_to_world.transform_point3(Vec3::new(0.0, 0.0, -5.0));
        let clip = world_to_projection_space(&camera, 16.0 / 9.0) * ahead.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "{ndc:?}");
        assert!(ndc.z > 0.0 && ndc.z < 1.0);

        let camera_position = view_to_world.transform_point3(Vec3::ZERO);
        assert!((camera_position - Vec3::from_array(camera.position_world_space)).length() < 1e-4);
    }

    #[test]
    fn view_space_x_points_left_on_screen() {
        let camera = Camera::default();
        let view_to_world = world_to_view_space(&camera).inverse();
        let right_in_view = view_to_world.transform_point3(Vec3::new(1.0, 0.0, -5.0));
        let clip = world_to_projection_space(&camera, 1.0) * right_in_view.extend(1.0);
        assert!(clip.x / clip.w < 0.0);
    }

    #[test]
    fn frozen_noise_is_constant() {
        let mut noise = NoiseRandomizer::new(7);
        assert_eq!(noise.next(false), [0; 4]);
        let first = noise.next(true);
        let second = noise.next(true);
        assert_ne!(first, second);
    }

    #[test]
    fn packing_mode_and_sample_count_reach_the_constants() {
        let camera = Camera::default();
        let settings = RenderSettings::default();
        let constants = FrameConstants::new(&FrameInputs {
            camera: &camera,
            extent: (800, 600),
            settings: &settings,
            sample_count: 12,
            blend_weight: 0.0,
            capture_byte: CaptureByte::High,
            light_count: 3,
            noise_random: [17, 0, 0, 0],
        });
        assert_eq!(constants.counts, [12, 2, 3, 17 % NOISE_LAYER_COUNT]);
        assert_eq!(constants.viewport[0], 800.0);
        assert_eq!(constants.factors[0], settings.exposure_factor);
        assert_eq!(constants.factors[3], 0.0);
    }
}
