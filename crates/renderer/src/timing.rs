//! Frame durations for the estimator and the timings log.
//!
//! With timestamp queries each slot brackets its render commands with two
//! timestamps, resolves them into a small buffer and maps it after
//! submission. The result is collected when the slot comes round again, at
//! which point the scheduler has already waited for its completion signal.
//! Without them the interval between consecutive acquisitions is used, which
//! also counts presentation and any CPU stall.

use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};

/// Both features are needed to write timestamps between passes.
pub(crate) const TIMESTAMP_FEATURES: wgpu::Features =
    wgpu::Features::TIMESTAMP_QUERY.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

const TIMESTAMP_BYTES: u64 = 2 * wgpu::QUERY_SIZE as u64;

/// Duration of one rendered frame in device ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameTiming {
    pub start_tick: u64,
    pub end_tick: u64,
    pub tick_period_ns: f64,
    pub sample_index: u32,
}

/// Identifies the frame a measurement belongs to. Measurements from an
/// older accumulation run are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameTag {
    pub sample_index: u32,
    pub generation: u64,
}

pub(crate) enum FrameTimer {
    Gpu(GpuTimer),
    Acquire(AcquireClock),
}

impl FrameTimer {
    /// Timestamp queries when the device has them, the acquire clock otherwise.
    pub fn new(device: &wgpu::Device, slot_count: usize, timestamp_period: Option<f32>) -> Self {
        match timestamp_period {
            Some(period) if device.features().contains(TIMESTAMP_FEATURES) => {
                tracing::debug!(period_ns = period, "timing frames with GPU timestamps");
                FrameTimer::Gpu(GpuTimer::new(device, slot_count, period))
            }
            _ => {
                tracing::warn!(
                    "GPU timestamp queries unavailable; frame times include presentation and CPU stalls"
                );
                FrameTimer::Acquire(AcquireClock::new())
            }
        }
    }
}

struct PendingReadback {
    tag: FrameTag,
    mapped: Receiver<Result<(), wgpu::BufferAsyncError>>,
}

struct SlotQueries {
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    pending: Option<PendingReadback>,
}

pub(crate) struct GpuTimer {
    device: wgpu::Device,
    query_set: wgpu::QuerySet,
    slots: Vec<SlotQueries>,
    tick_period_ns: f64,
}

impl GpuTimer {
    fn new(device: &wgpu::Device, slot_count: usize, tick_period_ns: f32) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("frame timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 2 * slot_count as u32,
        });
        let slots = (0..slot_count)
            .map(|_| SlotQueries {
                resolve: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("timestamp resolve"),
                    size: TIMESTAMP_BYTES,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                readback: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("timestamp readback"),
                    size: TIMESTAMP_BYTES,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                pending: None,
            })
            .collect();
        Self {
            device: device.clone(),
            query_set,
            slots,
            tick_period_ns: tick_period_ns as f64,
        }
    }

    /// Takes the measurement of the frame last submitted from `slot`.
    /// Returns `None` if there is none or it has not been mapped yet.
    pub fn collect(&mut self, slot: usize) -> Option<(FrameTiming, FrameTag)> {
        let queries = self.slots.get_mut(slot)?;
        let pending = queries.pending.as_ref()?;
        let status = match pending.mapped.try_recv() {
            Err(TryRecvError::Empty) => {
                if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
                    tracing::warn!(error = %err, "device poll failed while reading timestamps");
                }
                pending.mapped.try_recv()
            }
            other => other,
        };
        let tag = pending.tag;
        match status {
            Err(TryRecvError::Empty) => {
                tracing::trace!(slot, "timestamps not mapped yet");
                None
            }
            Err(TryRecvError::Disconnected) => {
                queries.pending = None;
                None
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to map frame timestamps");
                queries.pending = None;
                None
            }
            Ok(Ok(())) => {
                let ticks = {
                    let view = queries.readback.slice(..).get_mapped_range();
                    decode_timestamps(&view)
                };
                queries.readback.unmap();
                queries.pending = None;
                ticks.map(|(start_tick, end_tick)| {
                    let timing = FrameTiming {
                        start_tick,
                        end_tick,
                        tick_period_ns: self.tick_period_ns,
                        sample_index: tag.sample_index,
                    };
                    (timing, tag)
                })
            }
        }
    }

    /// Writes the start timestamp. Returns false, and writes nothing, while
    /// the slot's readback buffer still holds an uncollected measurement.
    pub fn begin(&self, encoder: &mut wgpu::CommandEncoder, slot: usize) -> bool {
        let free = self.slots.get(slot).is_some_and(|queries| queries.pending.is_none());
        if free {
            encoder.write_timestamp(&self.query_set, start_query(slot));
        }
        free
    }

    /// Writes the end timestamp and copies both into the readback buffer.
    pub fn end(&self, encoder: &mut wgpu::CommandEncoder, slot: usize) {
        let Some(queries) = self.slots.get(slot) else {
            return;
        };
        let first = start_query(slot);
        encoder.write_timestamp(&self.query_set, first + 1);
        encoder.resolve_query_set(&self.query_set, first..first + 2, &queries.resolve, 0);
        encoder.copy_buffer_to_buffer(&queries.resolve, 0, &queries.readback, 0, TIMESTAMP_BYTES);
    }

    /// Maps the readback buffer once the submitted frame completes.
    pub fn submitted(&mut self, slot: usize, tag: FrameTag) {
        let Some(queries) = self.slots.get_mut(slot) else {
            return;
        };
        let (sender, mapped) = crossbeam_channel::bounded(1);
        queries.readback.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        queries.pending = Some(PendingReadback { tag, mapped });
    }
}

fn start_query(slot: usize) -> u32 {
    2 * slot as u32
}

/// Start and end ticks from a resolved query pair. Drivers that do not
/// advance the counter produce an empty interval, which is rejected.
pub(crate) fn decode_timestamps(bytes: &[u8]) -> Option<(u64, u64)> {
    let bytes = bytes.get(..TIMESTAMP_BYTES as usize)?;
    let [start, end] = bytemuck::pod_read_unaligned::<[u64; 2]>(bytes);
    (end > start).then_some((start, end))
}

/// Nanosecond interval between two consecutive acquisitions, attributed to
/// the frame rendered between them.
pub(crate) struct AcquireClock {
    origin: Instant,
    previous: Option<(Instant, FrameTag)>,
}

impl AcquireClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            previous: None,
        }
    }

    /// Called once per frame with its acquisition time. Returns the timing
    /// of the frame acquired before it.
    pub fn lap(&mut self, acquired: Instant, tag: FrameTag) -> Option<(FrameTiming, FrameTag)> {
        let previous = self.previous.replace((acquired, tag));
        let (started, previous_tag) = previous?;
        let timing = FrameTiming {
            start_tick: self.ticks(started),
            end_tick: self.ticks(acquired),
            tick_period_ns: 1.0,
            sample_index: previous_tag.sample_index,
        };
        Some((timing, previous_tag))
    }

    fn ticks(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.origin).as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tag(sample_index: u32) -> FrameTag {
        FrameTag {
            sample_index,
            generation: 0,
        }
    }

    #[test]
    fn timestamps_decode_in_order() {
        let bytes: Vec<u8> = [1_000u64, 4_500].iter().flat_map(|tick| tick.to_le_bytes()).collect();
        assert_eq!(decode_timestamps(&bytes), Some((1_000, 4_500)));
        assert_eq!(decode_timestamps(&bytes[..8]), None);

        let stuck: Vec<u8> = [7u64, 7].iter().flat_map(|tick| tick.to_le_bytes()).collect();
        assert_eq!(decode_timestamps(&stuck), None);
    }

    #[test]
    fn slots_use_disjoint_query_pairs() {
        assert_eq!(start_query(0), 0);
        assert_eq!(start_query(2), 4);
    }

    #[test]
    fn acquire_interval_belongs_to_the_earlier_frame() {
        let mut clock = AcquireClock::new();
        let start = clock.origin + Duration::from_millis(5);
        assert!(clock.lap(start, tag(0)).is_none());

        let (timing, measured) = clock
            .lap(start + Duration::from_millis(16), tag(1))
            .expect("second acquisition closes the first frame");
        assert_eq!(measured, tag(0));
        assert_eq!(timing.sample_index, 0);
        assert_eq!(timing.end_tick - timing.start_tick, 16_000_000);
        assert_eq!(timing.tick_period_ns, 1.0);
    }
}
