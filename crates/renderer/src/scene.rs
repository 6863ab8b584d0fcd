//! Scene geometry.
//!
//! Geometry files are raw little-endian triangle soups: a `u32` triangle
//! count followed by nine `f32` coordinates per triangle. Anything that
//! cannot be read falls back to a ground plane so that lights still have
//! something to illuminate.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use benchconfig::SceneEntry;
use wgpu::util::DeviceExt;

const GROUND_HALF_EXTENT: f32 = 20.0;
const MAX_TRIANGLES: u32 = 1 << 26;

pub(crate) fn parse_triangle_soup(bytes: &[u8]) -> Result<Vec<[f32; 3]>> {
    let header: [u8; 4] = bytes
        .get(..4)
        .and_then(|slice| slice.try_into().ok())
        .context("geometry file is shorter than its header")?;
    let triangle_count = u32::from_le_bytes(header);
    anyhow::ensure!(
        triangle_count > 0 && triangle_count <= MAX_TRIANGLES,
        "implausible triangle count {triangle_count}"
    );
    let body = &bytes[4..];
    let expected = triangle_count as usize * 9 * 4;
    anyhow::ensure!(
        body.len() == expected,
        "expected {expected} bytes of vertex data for {triangle_count} triangles, found {}",
        body.len()
    );
    Ok(body
        .chunks_exact(12)
        .map(|vertex| {
            let component = |i: usize| {
                f32::from_le_bytes([vertex[4 * i], vertex[4 * i + 1], vertex[4 * i + 2], vertex[4 * i + 3]])
            };
            [component(0), component(1), component(2)]
        })
        .collect())
}

/// Two triangles facing +z.
pub(crate) fn ground_plane() -> Vec<[f32; 3]> {
    let e = GROUND_HALF_EXTENT;
    vec![
        [-e, -e, 0.0],
        [e, -e, 0.0],
        [e, e, 0.0],
        [-e, -e, 0.0],
        [e, e, 0.0],
        [-e, e, 0.0],
    ]
}

fn load_positions(path: &Path) -> Result<Vec<[f32; 3]>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_triangle_soup(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

pub(crate) struct SceneGeometry {
    /// Positions for the visibility stage, three per triangle.
    pub vertex_buffer: wgpu::Buffer,
    /// The same positions as `vec4`s for the shading stage.
    pub triangle_buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl SceneGeometry {
    pub fn load(device: &wgpu::Device, entry: &SceneEntry) -> Self {
        let positions = match load_positions(&entry.geometry) {
            Ok(positions) => {
                tracing::info!(
                    scene = %entry.name,
                    triangles = positions.len() / 3,
                    "scene geometry loaded"
                );
                positions
            }
            Err(err) => {
                tracing::warn!(
                    scene = %entry.name,
                    error = %format!("{err:#}"),
                    "scene geometry unavailable; using ground plane"
                );
                ground_plane()
            }
        };
        tracing::debug!(textures = %entry.textures.display(), "material textures are not used by the shading stage");

        let padded: Vec<[f32; 4]> = positions.iter().map(|&[x, y, z]| [x, y, z, 1.0]).collect();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("scene vertices"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let triangle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("scene triangles"),
            contents: bytemuck::cast_slice(&padded),
            usage: wgpu::BufferUsages::STORAGE,
        });
        Self {
            vertex_buffer,
            triangle_buffer,
            vertex_count: positions.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soup(triangles: &[[f32; 9]]) -> Vec<u8> {
        let mut bytes = (triangles.len() as u32).to_le_bytes().to_vec();
        for triangle in triangles {
            for value in triangle {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn parses_little_endian_soup() {
        let bytes = soup(&[[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.5]]);
        let positions = parse_triangle_soup(&bytes).expect("parse");
        assert_eq!(positions, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.5]]);
    }

    #[test]
    fn rejects_truncated_and_empty_files() {
        let mut bytes = soup(&[[0.0; 9]]);
        bytes.pop();
        assert!(parse_triangle_soup(&bytes).is_err());
        assert!(parse_triangle_soup(&soup(&[])).is_err());
        assert!(parse_triangle_soup(&[1, 0]).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_ground_plane() {
        assert!(load_positions(Path::new("/nonexistent/scene.bin")).is_err());
        let plane = ground_plane();
        assert_eq!(plane.len(), 6);
        assert!(plane.iter().all(|vertex| vertex[2] == 0.0));
    }
}
