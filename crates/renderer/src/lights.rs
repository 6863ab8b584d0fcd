//! GPU copies of the polygonal lights.
//!
//! Buffer sizes depend only on the light and vertex counts, so they are
//! rebuilt when those change and rewritten every frame otherwise. Light
//! textures share one array texture; layer 0 is plain white.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use image::imageops::FilterType;
use orchestrator::{PolygonalLight, SceneState};
use wgpu::util::DeviceExt;

use crate::tables::{create_layered_texture, LayeredTexture};

pub(crate) const LIGHT_TEXTURE_RESOLUTION: u32 = 256;
const HEADER_ENTRIES_PER_LIGHT: usize = 3;

/// Header entries (plane, emission, info) and world-space vertices of
/// every light, laid out as `shaders/lights.glsl` reads them.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct PackedLights {
    pub headers: Vec<[f32; 4]>,
    pub vertices: Vec<[f32; 4]>,
}

pub(crate) fn pack_lights(lights: &[PolygonalLight], layer_of: impl Fn(Option<&str>) -> u32) -> PackedLights {
    let mut packed = PackedLights::default();
    for light in lights {
        let first = packed.vertices.len() as f32;
        let [r, g, b] = light.header.surface_radiance;
        packed.headers.push(light.header.plane);
        packed.headers.push([r, g, b, light.texturing().code() as f32]);
        packed.headers.push([
            first,
            light.vertex_count() as f32,
            layer_of(light.texture_path.as_deref()) as f32,
            0.0,
        ]);
        packed
            .vertices
            .extend(light.world_space_vertices().into_iter().map(|[x, y, z]| [x, y, z, 1.0]));
    }
    packed
}

/// Distinct texture paths in first-use order. Layer `i + 1` holds path `i`.
pub(crate) fn texture_paths(lights: &[PolygonalLight]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for path in lights.iter().filter_map(|light| light.texture_path.as_ref()) {
        if !paths.contains(path) {
            paths.push(path.clone());
        }
    }
    paths
}

pub(crate) struct LightBuffers {
    pub headers: wgpu::Buffer,
    pub vertices: wgpu::Buffer,
}

impl LightBuffers {
    pub fn new(device: &wgpu::Device, scene: &SceneState) -> Self {
        let packed = pack_lights(&scene.lights, |_| 0);
        let vertex_count: usize = packed.vertices.len();
        tracing::debug!(lights = scene.lights.len(), vertices = vertex_count, "creating light buffers");
        Self {
            headers: storage_buffer(device, "light headers", &packed.headers, scene.lights.len() * HEADER_ENTRIES_PER_LIGHT),
            vertices: storage_buffer(device, "light vertices", &packed.vertices, vertex_count),
        }
    }

    /// Uploads current light positions and emission.
    pub fn write(&self, queue: &wgpu::Queue, scene: &SceneState, textures: &LightTextures) {
        let packed = pack_lights(&scene.lights, |path| textures.layer_of(path));
        write_fitting(queue, &self.headers, &packed.headers);
        write_fitting(queue, &self.vertices, &packed.vertices);
    }
}

fn storage_buffer(device: &wgpu::Device, label: &str, data: &[[f32; 4]], entries: usize) -> wgpu::Buffer {
    // Bindings must not be empty.
    let mut contents = data.to_vec();
    contents.resize(entries.max(1), [0.0; 4]);
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&contents),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

fn write_fitting(queue: &wgpu::Queue, buffer: &wgpu::Buffer, data: &[[f32; 4]]) {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return;
    }
    if bytes.len() as u64 > buffer.size() {
        tracing::warn!(
            needed = bytes.len(),
            capacity = buffer.size(),
            "light data outgrew its buffer; skipping upload"
        );
        return;
    }
    queue.write_buffer(buffer, 0, bytes);
}

pub(crate) struct LightTextures {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    layers: HashMap<String, u32>,
}

impl LightTextures {
    pub fn load(device: &wgpu::Device, queue: &wgpu::Queue, scene: &SceneState) -> Result<Self> {
        let paths = texture_paths(&scene.lights);
        let texel_count = (LIGHT_TEXTURE_RESOLUTION * LIGHT_TEXTURE_RESOLUTION) as usize;
        let mut data = vec![255u8; texel_count * 4 * (paths.len() + 1)];
        let mut layers = HashMap::new();

        for (index, path) in paths.iter().enumerate() {
            let layer = index as u32 + 1;
            layers.insert(path.clone(), layer);
            let offset = layer as usize * texel_count * 4;
            match load_layer(Path::new(path)) {
                Ok(pixels) => data[offset..offset + pixels.len()].copy_from_slice(&pixels),
                Err(err) => {
                    tracing::warn!(path = %path, error = %format!("{err:#}"), "light texture unavailable; using white");
                }
            }
        }

        let (texture, view) = create_layered_texture(
            device,
            queue,
            &LayeredTexture {
                label: "light textures",
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                width: LIGHT_TEXTURE_RESOLUTION,
                height: LIGHT_TEXTURE_RESOLUTION,
                layers: paths.len() as u32 + 1,
                data: &data,
            },
        );
        tracing::debug!(textures = paths.len(), "light textures ready");
        Ok(Self {
            _texture: texture,
            view,
            layers,
        })
    }

    pub fn layer_of(&self, path: Option<&str>) -> u32 {
        path.and_then(|path| self.layers.get(path).copied()).unwrap_or(0)
    }
}

fn load_layer(path: &Path) -> Result<Vec<u8>> {
    let image = image::open(path)?.to_rgba8();
    let resized = image::imageops::resize(
        &image,
        LIGHT_TEXTURE_RESOLUTION,
        LIGHT_TEXTURE_RESOLUTION,
        FilterType::Triangle,
    );
    Ok(resized.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_headers_and_world_vertices() {
        let mut second = PolygonalLight::default();
        second.vertices.pop();
        second.texture_path = Some("lamp.png".into());
        second.update();
        let lights = vec![PolygonalLight::default(), second];

        let packed = pack_lights(&lights, |path| if path.is_some() { 1 } else { 0 });
        assert_eq!(packed.headers.len(), 6);
        assert_eq!(packed.vertices.len(), 7);
        assert_eq!(packed.headers[2], [0.0, 4.0, 0.0, 0.0]);
        assert_eq!(packed.headers[5], [4.0, 3.0, 1.0, 0.0]);
        assert_eq!(packed.headers[0], lights[0].header.plane);
        assert!(packed.vertices.iter().all(|vertex| vertex[3] == 1.0));
    }

    #[test]
    fn texture_paths_are_deduplicated() {
        let mut light = PolygonalLight::default();
        light.texture_path = Some("a.png".into());
        let mut other = light.clone();
        other.texture_path = Some("b.png".into());
        let lights = vec![light.clone(), PolygonalLight::default(), other, light];
        assert_eq!(texture_paths(&lights), vec!["a.png".to_string(), "b.png".to_string()]);
    }

    #[test]
    fn missing_texture_reports_an_error() {
        assert!(load_layer(Path::new("/nonexistent/light.png")).is_err());
    }
}
