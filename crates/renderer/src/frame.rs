//! [`PresentationDevice`] over a wgpu surface.
//!
//! wgpu hides the swapchain image index, so slots rotate round-robin. A
//! slot's completion signal is fed by `Queue::on_submitted_work_done`, which
//! fires from inside `Device::poll`.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use orchestrator::{CompletionSignal, DeviceError, ImageSource, PresentationDevice, StagingImage, WaitStatus};

use crate::context::GpuContext;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const ACQUIRE_ATTEMPTS: u32 = 8;

pub(crate) struct FenceSignal {
    device: wgpu::Device,
    sender: Sender<()>,
    receiver: Receiver<()>,
    signaled: bool,
}

impl FenceSignal {
    fn new(device: wgpu::Device) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        Self {
            device,
            sender,
            receiver,
            signaled: false,
        }
    }

    fn arm(&self) -> impl FnOnce() + Send + 'static {
        let sender = self.sender.clone();
        move || {
            let _ = sender.try_send(());
        }
    }
}

impl CompletionSignal for FenceSignal {
    fn wait(&mut self, timeout: Duration) -> Result<WaitStatus, DeviceError> {
        if self.signaled {
            return Ok(WaitStatus::Signaled);
        }
        let deadline = Instant::now() + timeout;
        loop {
            self.device
                .poll(wgpu::PollType::Poll)
                .map_err(|err| DeviceError::Lost(err.to_string()))?;
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(()) => {
                    self.signaled = true;
                    return Ok(WaitStatus::Signaled);
                }
                Err(RecvTimeoutError::Timeout) if Instant::now() >= deadline => {
                    return Ok(WaitStatus::TimedOut);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Lost("completion channel closed".into()));
                }
            }
        }
    }

    fn reset(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        self.signaled = false;
    }
}

/// The acquired surface texture between acquire and present.
#[derive(Default)]
pub(crate) struct FrameSync {
    frame: Option<wgpu::SurfaceTexture>,
    view: Option<wgpu::TextureView>,
    pub(crate) acquired_at: Option<Instant>,
}

impl FrameSync {
    pub(crate) fn view(&self) -> Option<&wgpu::TextureView> {
        self.view.as_ref()
    }

    pub(crate) fn texture(&self) -> Option<&wgpu::Texture> {
        self.frame.as_ref().map(|frame| &frame.texture)
    }
}

/// Commands recorded for one slot, consumed by submit.
#[derive(Default)]
pub(crate) struct FrameRecording {
    commands: Option<wgpu::CommandBuffer>,
}

impl FrameRecording {
    pub(crate) fn set(&mut self, commands: wgpu::CommandBuffer) {
        self.commands = Some(commands);
    }
}

impl PresentationDevice for GpuContext {
    type Signal = FenceSignal;
    type Sync = FrameSync;
    type Recording = FrameRecording;

    fn image_count(&self) -> usize {
        self.slot_count()
    }

    fn create_signal(&mut self, _image_index: usize) -> Result<FenceSignal> {
        Ok(FenceSignal::new(self.device.clone()))
    }

    fn create_sync(&mut self) -> Result<FrameSync> {
        Ok(FrameSync::default())
    }

    fn create_recording(&mut self, _image_index: usize) -> Result<FrameRecording> {
        Ok(FrameRecording::default())
    }

    fn acquire_image(&mut self, sync: &mut FrameSync) -> Result<usize, DeviceError> {
        let mut attempts = 0;
        let frame = loop {
            match self.surface.get_current_texture() {
                Ok(frame) => break frame,
                Err(wgpu::SurfaceError::Timeout) if attempts < ACQUIRE_ATTEMPTS => {
                    attempts += 1;
                    tracing::trace!(attempts, "surface acquire timed out; retrying");
                }
                Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                    return Err(DeviceError::SurfaceOutdated);
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    return Err(DeviceError::Lost("out of memory acquiring surface texture".into()));
                }
                Err(err) => return Err(DeviceError::Other(err.to_string())),
            }
        };
        if frame.suboptimal {
            tracing::trace!("acquired suboptimal surface texture");
        }
        sync.view = Some(frame.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        sync.frame = Some(frame);
        sync.acquired_at = Some(Instant::now());

        let image_index = self.next_image;
        self.next_image = (image_index + 1) % self.slot_count();
        Ok(image_index)
    }

    fn submit(
        &mut self,
        image_index: usize,
        recording: &mut FrameRecording,
        _sync: &FrameSync,
        signal: &mut FenceSignal,
    ) -> Result<(), DeviceError> {
        let commands = recording
            .commands
            .take()
            .ok_or_else(|| DeviceError::Other(format!("slot {image_index} has no recorded commands")))?;
        self.queue.submit(Some(commands));
        self.queue.on_submitted_work_done(signal.arm());
        Ok(())
    }

    fn present(&mut self, _image_index: usize, sync: &mut FrameSync) -> Result<(), DeviceError> {
        sync.view = None;
        let frame = sync
            .frame
            .take()
            .ok_or_else(|| DeviceError::Other("no acquired surface texture to present".into()))?;
        frame.present();
        Ok(())
    }
}

/// Reads the just-submitted surface texture back for screenshots.
pub(crate) struct SurfaceReadback<'a> {
    pub gpu: &'a GpuContext,
    pub texture: Option<&'a wgpu::Texture>,
}

impl ImageSource for SurfaceReadback<'_> {
    fn wait_idle(&mut self) -> Result<()> {
        self.gpu
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed to wait for GPU idle: {err}"))?;
        Ok(())
    }

    fn read_image(&mut self, _image_index: usize) -> Result<StagingImage> {
        anyhow::ensure!(self.gpu.supports_copy, "surface cannot be copied from");
        let format = self
            .gpu
            .capture_format
            .with_context(|| format!("cannot decode surface format {:?}", self.gpu.surface_format))?;
        let texture = self.texture.context("no surface texture acquired")?;
        let width = texture.width();
        let height = texture.height();
        let row_pitch = padded_row_pitch(width);

        let device = &self.gpu.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screenshot staging"),
            size: row_pitch as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("screenshot copy"),
        });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_pitch as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed to wait for screenshot copy: {err}"))?;
        receiver
            .recv()
            .context("screenshot map callback dropped")?
            .context("failed to map screenshot buffer")?;

        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(StagingImage {
            format,
            width,
            height,
            row_pitch,
            data,
        })
    }
}

/// Row pitch of a 4-byte-per-pixel copy, padded to wgpu's alignment.
pub(crate) fn padded_row_pitch(width: u32) -> usize {
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    let unpadded = width as usize * 4;
    unpadded.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_pitch_is_aligned() {
        assert_eq!(padded_row_pitch(64), 256);
        assert_eq!(padded_row_pitch(65), 512);
        assert_eq!(padded_row_pitch(1), 256);
        assert_eq!(padded_row_pitch(1920) % 256, 0);
    }
}
