//! Binary snapshot of the camera and polygonal lights.
//!
//! Layout, all little endian:
//!
//! | field | type |
//! |---|---|
//! | camera | 9 × f32 |
//! | legacy count | u32, always 0 |
//! | light count | u32 |
//! | per light: header | 20 × f32, vertex count u32, texturing u32 |
//! | per light: texture path length | u64, includes the NUL terminator, 0 = none |
//! | per light: texture path | bytes + NUL |
//! | per light: reserved | 2 × u64, always 0 |
//! | per light: vertices | 4 × vertex count × f32 |

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::scene::{Camera, LightHeader, PolygonalLight, SceneState};

const MAX_VERTEX_COUNT: u32 = 1 << 16;
const MAX_PATH_LENGTH: u64 = 1 << 12;
const CAMERA_FLOATS: usize = 9;
const HEADER_WORDS: usize = 22;

#[derive(Debug, thiserror::Error)]
pub enum QuicksaveError {
    #[error("failed to access quicksave {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("quicksave is truncated or unreadable: {0}")]
    Read(#[from] io::Error),
    #[error("quicksave is corrupt: {0}")]
    Corrupt(String),
}

/// What a quick load changed that the resource graph must know about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuickLoadChanges {
    pub light_count_changed: bool,
    pub light_texture_changed: bool,
}

impl QuickLoadChanges {
    /// Light topology changes are flagged when the count or any vertex count
    /// differs; texture changes when any light's texture path differs.
    pub fn between(old: &SceneState, new: &SceneState) -> Self {
        let count_changed = old.lights.len() != new.lights.len();
        let light_count_changed = count_changed
            || old
                .lights
                .iter()
                .zip(&new.lights)
                .any(|(a, b)| a.vertex_count() != b.vertex_count());
        let light_texture_changed = count_changed
            || old
                .lights
                .iter()
                .zip(&new.lights)
                .any(|(a, b)| a.texture_path != b.texture_path);
        Self {
            light_count_changed,
            light_texture_changed,
        }
    }
}

pub fn save(path: &Path, scene: &SceneState) -> Result<(), QuicksaveError> {
    let file = File::create(path).map_err(|source| QuicksaveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    write_quicksave(&mut writer, scene)?;
    writer.flush().map_err(|source| QuicksaveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), lights = scene.lights.len(), "quick saved");
    Ok(())
}

pub fn load(path: &Path) -> Result<SceneState, QuicksaveError> {
    let file = File::open(path).map_err(|source| QuicksaveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let scene = read_quicksave(&mut BufReader::new(file))?;
    tracing::info!(path = %path.display(), lights = scene.lights.len(), "quick loaded");
    Ok(scene)
}

pub fn write_quicksave<W: Write>(writer: &mut W, scene: &SceneState) -> Result<(), QuicksaveError> {
    let camera: [f32; CAMERA_FLOATS] = bytemuck::cast(scene.camera);
    for value in camera {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&(scene.lights.len() as u32).to_le_bytes())?;

    for light in &scene.lights {
        let mut header = light.header;
        header.vertex_count = light.vertices.len() as u32;
        let words: [u32; HEADER_WORDS] = bytemuck::cast(header);
        for word in words {
            writer.write_all(&word.to_le_bytes())?;
        }

        match &light.texture_path {
            Some(texture) => {
                writer.write_all(&(texture.len() as u64 + 1).to_le_bytes())?;
                writer.write_all(texture.as_bytes())?;
                writer.write_all(&[0])?;
            }
            None => writer.write_all(&0u64.to_le_bytes())?,
        }
        writer.write_all(&[0u8; 16])?;

        for vertex in &light.vertices {
            for value in vertex {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

pub fn read_quicksave<R: Read>(reader: &mut R) -> Result<SceneState, QuicksaveError> {
    let mut camera = [0f32; CAMERA_FLOATS];
    for value in &mut camera {
        *value = read_f32(reader)?;
    }
    let camera: Camera = bytemuck::cast(camera);

    let legacy = read_u32(reader)?;
    if legacy != 0 {
        tracing::debug!(legacy, "ignoring legacy light records count");
    }
    let light_count = read_u32(reader)?;

    let mut lights = Vec::with_capacity(light_count.min(1024) as usize);
    for index in 0..light_count {
        let mut words = [0u32; HEADER_WORDS];
        for word in &mut words {
            *word = read_u32(reader)?;
        }
        let mut header: LightHeader = bytemuck::cast(words);
        if header.vertex_count > MAX_VERTEX_COUNT {
            return Err(QuicksaveError::Corrupt(format!(
                "light {index} claims {} vertices",
                header.vertex_count
            )));
        }
        if header.scaling_y <= 0.0 {
            header.scaling_y = header.scaling_x;
        }

        let path_length = read_u64(reader)?;
        if path_length > MAX_PATH_LENGTH {
            return Err(QuicksaveError::Corrupt(format!(
                "light {index} texture path is {path_length} bytes long"
            )));
        }
        let texture_path = if path_length == 0 {
            None
        } else {
            let mut bytes = vec![0u8; path_length as usize];
            reader.read_exact(&mut bytes)?;
            if bytes.last() == Some(&0) {
                bytes.pop();
            }
            Some(String::from_utf8(bytes).map_err(|_| {
                QuicksaveError::Corrupt(format!("light {index} texture path is not UTF-8"))
            })?)
        };

        let mut reserved = [0u8; 16];
        reader.read_exact(&mut reserved)?;

        let mut vertices = Vec::with_capacity(header.vertex_count as usize);
        for _ in 0..header.vertex_count {
            let mut vertex = [0f32; 4];
            for value in &mut vertex {
                *value = read_f32(reader)?;
            }
            vertices.push(vertex);
        }

        lights.push(PolygonalLight {
            header,
            texture_path,
            vertices,
        });
    }

    Ok(SceneState { camera, lights })
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_f32<R: Read>(reader: &mut R) -> io::Result<f32> {
    read_u32(reader).map(f32::from_bits)
}
