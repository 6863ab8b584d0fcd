use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub(crate) const NOISE_RESOLUTION: u32 = 64;
pub(crate) const NOISE_LAYER_COUNT: u32 = 16;
const NOISE_SEED: u64 = 0x6c69_6768_7473;

/// Random RGBA8 texels, one square layer after another.
pub(crate) fn generate_noise(seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; (NOISE_RESOLUTION * NOISE_RESOLUTION * NOISE_LAYER_COUNT * 4) as usize];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// Noise texture array sampled by the shading stage.
pub(crate) struct NoiseTable {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl NoiseTable {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let data = generate_noise(NOISE_SEED);
        let (texture, view) = create_layered_texture(
            device,
            queue,
            &LayeredTexture {
                label: "noise table",
                format: wgpu::TextureFormat::Rgba8Unorm,
                width: NOISE_RESOLUTION,
                height: NOISE_RESOLUTION,
                layers: NOISE_LAYER_COUNT,
                data: &data,
            },
        );
        tracing::debug!(
            resolution = NOISE_RESOLUTION,
            layers = NOISE_LAYER_COUNT,
            "noise table ready"
        );
        Self {
            _texture: texture,
            view,
        }
    }
}

pub(crate) struct LayeredTexture<'a> {
    pub label: &'a str,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    /// Tightly packed 4-byte texels.
    pub data: &'a [u8],
}

/// Creates and fills a 2D array texture with a `D2Array` view.
pub(crate) fn create_layered_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    desc: &LayeredTexture<'_>,
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: desc.layers,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(desc.label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: desc.format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        desc.data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * desc.width),
            rows_per_image: Some(desc.height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(desc.label),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    });
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_seeded() {
        let first = generate_noise(3);
        assert_eq!(first.len(), (64 * 64 * 16 * 4) as usize);
        assert_eq!(first, generate_noise(3));
        assert_ne!(first, generate_noise(4));
    }
}
