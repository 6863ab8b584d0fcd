//! Bounded frames in flight over a presentation device.
//!
//! Each presentable image owns one [`FrameWorkload`]. Before a workload's
//! recording is reused, its completion signal must have been observed
//! signaled; this wait is what caps the number of submitted frames at the
//! image count. Acquisition uses a separate ring of sync objects indexed by
//! a rotating cursor since the image index is unknown until acquire returns.

use std::time::Duration;

use anyhow::Context;

/// Upper bound of a single completion wait. Waits loop on timeout.
pub const COMPLETION_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("surface is outdated and must be recreated")]
    SurfaceOutdated,
    #[error("device lost: {0}")]
    Lost(String),
    #[error("{0}")]
    Other(String),
}

/// GPU-to-CPU completion primitive for one workload.
pub trait CompletionSignal {
    fn wait(&mut self, timeout: Duration) -> Result<WaitStatus, DeviceError>;
    /// Returns the signal to the unsignaled state ahead of a new submission.
    fn reset(&mut self);
}

/// The surface provider and queue the scheduler submits to.
pub trait PresentationDevice {
    type Signal: CompletionSignal;
    /// Per-acquisition state, e.g. the acquired image.
    type Sync;
    /// Reusable per-image command recording and its per-frame data.
    type Recording;

    fn image_count(&self) -> usize;
    fn create_signal(&mut self, image_index: usize) -> anyhow::Result<Self::Signal>;
    fn create_sync(&mut self) -> anyhow::Result<Self::Sync>;
    fn create_recording(&mut self, image_index: usize) -> anyhow::Result<Self::Recording>;
    /// Blocks until a presentable image is available.
    fn acquire_image(&mut self, sync: &mut Self::Sync) -> Result<usize, DeviceError>;
    fn submit(
        &mut self,
        image_index: usize,
        recording: &mut Self::Recording,
        sync: &Self::Sync,
        signal: &mut Self::Signal,
    ) -> Result<(), DeviceError>;
    fn present(&mut self, image_index: usize, sync: &mut Self::Sync) -> Result<(), DeviceError>;
}

/// Fills one frame's recording. Called only once the recording is free.
pub trait FramePipeline<D: PresentationDevice> {
    fn record(
        &mut self,
        device: &mut D,
        recording: &mut D::Recording,
        sync: &D::Sync,
        image_index: usize,
    ) -> anyhow::Result<()>;

    /// Runs between submission and presentation. Screenshots read the
    /// presentable image here.
    fn after_submit(&mut self, _device: &mut D, _sync: &D::Sync, _image_index: usize) {}

    fn after_present(&mut self, _presented: bool) {}
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to acquire a presentable image: {0}")]
    Acquire(#[source] DeviceError),
    #[error("surface returned image {index} but only {count} workloads exist")]
    ImageIndex { index: usize, count: usize },
    #[error("waiting for frame {image_index} to complete failed: {source}")]
    Wait {
        image_index: usize,
        #[source]
        source: DeviceError,
    },
    #[error("failed to record frame: {0:#}")]
    Record(anyhow::Error),
    #[error("failed to submit frame: {0}")]
    Submit(#[source] DeviceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered { image_index: usize, presented: bool },
    /// Acquisition reported an outdated surface; nothing was submitted.
    Skipped,
}

struct FrameWorkload<D: PresentationDevice> {
    recording: D::Recording,
    signal: D::Signal,
    used: bool,
}

pub struct FrameInFlightScheduler<D: PresentationDevice> {
    workloads: Vec<FrameWorkload<D>>,
    syncs: Vec<D::Sync>,
    sync_cursor: usize,
    surface_needs_recreation: bool,
}

impl<D: PresentationDevice> FrameInFlightScheduler<D> {
    pub fn new(device: &mut D) -> anyhow::Result<Self> {
        let count = device.image_count();
        anyhow::ensure!(count > 0, "presentation device reports no images");

        let mut workloads = Vec::with_capacity(count);
        let mut syncs = Vec::with_capacity(count);
        for image_index in 0..count {
            workloads.push(FrameWorkload {
                recording: device
                    .create_recording(image_index)
                    .with_context(|| format!("failed to create recording for image {image_index}"))?,
                signal: device
                    .create_signal(image_index)
                    .with_context(|| format!("failed to create completion signal {image_index}"))?,
                used: false,
            });
            syncs.push(device.create_sync().context("failed to create frame sync")?);
        }
        tracing::debug!(images = count, "frame scheduler ready");

        Ok(Self {
            workloads,
            syncs,
            sync_cursor: count - 1,
            surface_needs_recreation: false,
        })
    }

    pub fn image_count(&self) -> usize {
        self.workloads.len()
    }

    /// Returns and clears the flag set by a failed presentation.
    pub fn take_recreate_request(&mut self) -> bool {
        std::mem::take(&mut self.surface_needs_recreation)
    }

    pub fn render_one_frame<P>(&mut self, device: &mut D, pipeline: &mut P) -> Result<FrameOutcome, SchedulerError>
    where
        P: FramePipeline<D> + ?Sized,
    {
        self.sync_cursor = (self.sync_cursor + 1) % self.syncs.len();
        let sync = &mut self.syncs[self.sync_cursor];

        let image_index = match device.acquire_image(sync) {
            Ok(index) => index,
            Err(DeviceError::SurfaceOutdated) => {
                tracing::debug!("surface outdated during acquire");
                self.surface_needs_recreation = true;
                return Ok(FrameOutcome::Skipped);
            }
            Err(err) => return Err(SchedulerError::Acquire(err)),
        };
        let count = self.workloads.len();
        let workload = self
            .workloads
            .get_mut(image_index)
            .ok_or(SchedulerError::ImageIndex {
                index: image_index,
                count,
            })?;

        if workload.used {
            wait_for(&mut workload.signal, image_index)?;
        }
        workload.signal.reset();
        // Only a successful submission arms the signal.
        workload.used = false;

        pipeline
            .record(device, &mut workload.recording, sync, image_index)
            .map_err(SchedulerError::Record)?;
        device
            .submit(image_index, &mut workload.recording, sync, &mut workload.signal)
            .map_err(SchedulerError::Submit)?;
        workload.used = true;
        pipeline.after_submit(device, sync, image_index);

        let presented = match device.present(image_index, sync) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "present failed; surface will be recreated");
                self.surface_needs_recreation = true;
                false
            }
        };
        pipeline.after_present(presented);

        Ok(FrameOutcome::Rendered {
            image_index,
            presented,
        })
    }

    /// Blocks until every submitted workload has completed.
    pub fn wait_all(&mut self) -> Result<(), SchedulerError> {
        for (image_index, workload) in self.workloads.iter_mut().enumerate() {
            if workload.used {
                wait_for(&mut workload.signal, image_index)?;
            }
        }
        Ok(())
    }
}

fn wait_for<S: CompletionSignal>(signal: &mut S, image_index: usize) -> Result<(), SchedulerError> {
    loop {
        match signal.wait(COMPLETION_WAIT_TIMEOUT) {
            Ok(WaitStatus::Signaled) => return Ok(()),
            Ok(WaitStatus::TimedOut) => {
                tracing::trace!(image_index, "frame still in flight");
            }
            Err(source) => return Err(SchedulerError::Wait { image_index, source }),
        }
    }
}
