use anyhow::Result;
use orchestrator::{SlotTargets, TargetRole};

pub(crate) fn role_format(role: TargetRole) -> wgpu::TextureFormat {
    match role {
        TargetRole::Depth => wgpu::TextureFormat::Depth32Float,
        TargetRole::Visibility => wgpu::TextureFormat::R32Uint,
        TargetRole::Shading => wgpu::TextureFormat::Rgba16Float,
        TargetRole::Accumulation => wgpu::TextureFormat::Rgba32Float,
    }
}

fn role_label(role: TargetRole) -> &'static str {
    match role {
        TargetRole::Depth => "depth target",
        TargetRole::Visibility => "visibility target",
        TargetRole::Shading => "shading target",
        TargetRole::Accumulation => "accumulation target",
    }
}

pub(crate) struct RenderTarget {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// One set of targets per frame slot.
pub(crate) struct RenderTargets {
    pub slots: Vec<SlotTargets<RenderTarget>>,
    pub extent: (u32, u32),
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, extent: (u32, u32), slot_count: usize) -> Result<Self> {
        anyhow::ensure!(slot_count > 1, "accumulation needs at least two frame slots");
        let size = wgpu::Extent3d {
            width: extent.0,
            height: extent.1,
            depth_or_array_layers: 1,
        };
        let slots = (0..slot_count)
            .map(|_| {
                SlotTargets::try_from_fn(|role| {
                    let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
                    if role != TargetRole::Depth {
                        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
                    }
                    let texture = device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(role_label(role)),
                        size,
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: role_format(role),
                        usage,
                        view_formats: &[],
                    });
                    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                    Ok::<_, anyhow::Error>(RenderTarget {
                        _texture: texture,
                        view,
                    })
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            width = extent.0,
            height = extent.1,
            slots = slot_count,
            "render targets created"
        );
        Ok(Self { slots, extent })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Attachment formats every stage is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RenderPassLayout {
    pub surface_format: wgpu::TextureFormat,
}

impl RenderPassLayout {
    pub fn target_format(&self, role: TargetRole) -> wgpu::TextureFormat {
        role_format(role)
    }
}

/// The slot whose accumulation target the accumulate stage of `image`
/// reads. A slot never reads its own target; on the first frame after a
/// rebuild the sample count is zero and the chosen source is ignored.
pub(crate) fn accumulation_source(image: usize, previous: usize, slot_count: usize) -> usize {
    if previous != image {
        previous
    } else {
        (image + slot_count - 1) % slot_count
    }
}
