use anyhow::{anyhow, Context as AnyhowContext, Result};
use orchestrator::{SourceFormat, SurfaceStatus};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::timing::TIMESTAMP_FEATURES;

/// Frames the presentation engine may queue ahead of the one being rendered.
const FRAME_LATENCY: u32 = 2;

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub surface_format: wgpu::TextureFormat,
    /// Layout of read-back surface pixels, if screenshots can decode them.
    pub capture_format: Option<SourceFormat>,
    pub supports_copy: bool,
    /// Nanoseconds per timestamp tick, when frames can be timed on the GPU.
    pub timestamp_period: Option<f32>,
    surface_caps: wgpu::SurfaceCapabilities,
    /// Round-robin cursor standing in for the swapchain image index.
    pub(crate) next_image: usize,
}

impl GpuContext {
    pub(crate) fn new<T>(target: &T, initial_size: PhysicalSize<u32>, v_sync: bool) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // SAFETY: the window outlives the context; the session drops the
        // context before the window.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::info!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        let width = initial_size.width.max(1);
        let height = initial_size.height.max(1);
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
            );
        }

        let surface_caps = surface.get_capabilities(&adapter);
        anyhow::ensure!(
            !surface_caps.formats.is_empty(),
            "surface reports no supported formats"
        );
        // The copy stage encodes sRGB itself and writes raw byte planes for
        // HDR captures, so the surface must not re-encode.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb() && capture_format_of(*format).is_some())
            .or_else(|| surface_caps.formats.iter().copied().find(|format| !format.is_srgb()))
            .unwrap_or_else(|| {
                let fallback = surface_caps.formats[0];
                tracing::warn!(?fallback, "no linear surface format available");
                fallback
            });
        let capture_format = capture_format_of(surface_format);

        let timestamps = adapter.features().contains(TIMESTAMP_FEATURES);
        let required_features = if timestamps {
            TIMESTAMP_FEATURES
        } else {
            wgpu::Features::empty()
        };
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("polybench device"),
            required_features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;
        let timestamp_period = timestamps.then(|| queue.get_timestamp_period());

        let supports_copy = surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if supports_copy {
            usage |= wgpu::TextureUsages::COPY_SRC;
        } else {
            tracing::warn!("surface does not advertise COPY_SRC; screenshots are unavailable");
        }

        let present_mode = select_present_mode(&surface_caps.present_modes, v_sync, wgpu::PresentMode::Fifo);
        tracing::debug!(?present_mode, ?surface_format, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: FRAME_LATENCY,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            surface_format,
            capture_format,
            supports_copy,
            timestamp_period,
            surface_caps,
            next_image: 0,
        })
    }

    pub(crate) fn extent(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Number of frame slots kept in flight.
    pub(crate) fn slot_count(&self) -> usize {
        FRAME_LATENCY as usize + 1
    }

    /// Reconfigures the surface for `size` and the wanted present mode. A
    /// zero-area size leaves the surface untouched.
    pub(crate) fn resize(&mut self, size: PhysicalSize<u32>, v_sync: bool) -> SurfaceStatus {
        if size.width == 0 || size.height == 0 {
            return SurfaceStatus::Minimized;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.config.present_mode =
            select_present_mode(&self.surface_caps.present_modes, v_sync, self.config.present_mode);
        self.surface.configure(&self.device, &self.config);
        self.next_image = 0;
        tracing::debug!(
            width = size.width,
            height = size.height,
            present_mode = ?self.config.present_mode,
            "surface reconfigured"
        );
        SurfaceStatus::Ready
    }
}

/// Prefers Fifo with vsync, otherwise Immediate then Mailbox.
fn select_present_mode(
    available: &[wgpu::PresentMode],
    v_sync: bool,
    fallback: wgpu::PresentMode,
) -> wgpu::PresentMode {
    let find = |wanted: wgpu::PresentMode| available.iter().copied().find(|mode| *mode == wanted);
    if v_sync {
        find(wgpu::PresentMode::Fifo).unwrap_or(fallback)
    } else {
        find(wgpu::PresentMode::Immediate)
            .or_else(|| find(wgpu::PresentMode::Mailbox))
            .unwrap_or(fallback)
    }
}

pub(crate) fn capture_format_of(format: wgpu::TextureFormat) -> Option<SourceFormat> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Some(SourceFormat::Bgra8),
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Some(SourceFormat::Rgba8),
        // Red occupies the low bits.
        wgpu::TextureFormat::Rgb10a2Unorm => Some(SourceFormat::A2B10G10R10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_prefers_fifo_and_tearing_prefers_immediate() {
        use wgpu::PresentMode::*;
        let modes = [Fifo, Mailbox, Immediate];
        assert_eq!(select_present_mode(&modes, true, Mailbox), Fifo);
        assert_eq!(select_present_mode(&modes, false, Fifo), Immediate);
        assert_eq!(select_present_mode(&[Fifo, Mailbox], false, Fifo), Mailbox);
        assert_eq!(select_present_mode(&[Fifo], false, Fifo), Fifo);
    }

    #[test]
    fn capture_formats_cover_common_surfaces() {
        assert_eq!(
            capture_format_of(wgpu::TextureFormat::Bgra8Unorm),
            Some(SourceFormat::Bgra8)
        );
        assert_eq!(
            capture_format_of(wgpu::TextureFormat::Rgb10a2Unorm),
            Some(SourceFormat::A2B10G10R10)
        );
        assert_eq!(capture_format_of(wgpu::TextureFormat::Rgba16Float), None);
    }
}
