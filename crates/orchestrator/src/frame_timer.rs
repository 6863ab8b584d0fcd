//! Median frame-time tracking and the per-experiment timings log.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Number of frame durations the estimator remembers.
pub const FRAME_TIME_CAPACITY: usize = 100;

const TIMINGS_BUFFER_BYTES: usize = 1 << 16;

/// Fixed-capacity ring with an explicit write cursor.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    next: usize,
}

impl<T: Copy> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "circular buffer capacity must be positive");
        Self {
            slots: vec![None; capacity],
            next: 0,
        }
    }

    /// Writes into the slot under the cursor and advances it, overwriting
    /// the oldest entry once full.
    pub fn push(&mut self, value: T) {
        self.slots[self.next] = Some(value);
        self.next = (self.next + 1) % self.slots.len();
    }

    pub fn latest(&self) -> Option<T> {
        let previous = (self.next + self.slots.len() - 1) % self.slots.len();
        self.slots[previous]
    }

    /// Written entries from newest to oldest, skipping the slot the next
    /// push will overwrite. At most `capacity - 1` values are yielded.
    pub fn iter_valid(&self) -> impl Iterator<Item = T> + '_ {
        let len = self.slots.len();
        (1..len).filter_map(move |back| self.slots[(self.next + len - back) % len])
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.next = 0;
    }
}

/// `<sample index>,<milliseconds>` lines for one experiment.
#[derive(Debug)]
pub struct TimingsLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TimingsLog {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(TIMINGS_BUFFER_BYTES, file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, sample_index: u32, milliseconds: f64) -> io::Result<()> {
        writeln!(self.writer, "{sample_index},{milliseconds:.6}")
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Robust frame-time statistics over the last [`FRAME_TIME_CAPACITY`]
/// frames.
#[derive(Debug, Clone)]
pub struct FrameTimeEstimator {
    seconds: CircularBuffer<f32>,
}

impl Default for FrameTimeEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimeEstimator {
    pub fn new() -> Self {
        Self {
            seconds: CircularBuffer::new(FRAME_TIME_CAPACITY),
        }
    }

    /// Stores the duration of one frame given two device ticks and the tick
    /// period in nanoseconds. Returns the duration in seconds. A log write
    /// failure is reported but the sample is kept.
    pub fn record(
        &mut self,
        start_tick: u64,
        end_tick: u64,
        tick_period_ns: f64,
        sample_index: u32,
        log: Option<&mut TimingsLog>,
    ) -> f32 {
        let nanoseconds = end_tick.saturating_sub(start_tick) as f64 * tick_period_ns;
        let seconds = (nanoseconds * 1.0e-9) as f32;
        self.seconds.push(seconds);
        if let Some(log) = log {
            if let Err(err) = log.append(sample_index, nanoseconds * 1.0e-6) {
                tracing::warn!(path = %log.path().display(), error = %err, "failed to append frame time");
            }
        }
        seconds
    }

    /// Median of the valid recorded durations, or the latest one verbatim.
    /// Returns 0 when nothing has been recorded.
    pub fn query(&self, want_last: bool) -> f32 {
        if want_last {
            return self.seconds.latest().unwrap_or(0.0);
        }
        let mut values: Vec<f32> = self.seconds.iter_valid().filter(|&v| v > 0.0).collect();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(f32::total_cmp);
        values[values.len() / 2]
    }

    pub fn reset(&mut self) {
        self.seconds.clear();
    }
}

/// Emits the estimator's statistics at a fixed wall-clock interval.
#[derive(Debug)]
pub struct FrameTimeReport {
    interval: Duration,
    last: Instant,
}

impl FrameTimeReport {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn maybe_report(&mut self, estimator: &FrameTimeEstimator, sample_count: u32) {
        if self.last.elapsed() < self.interval {
            return;
        }
        self.last = Instant::now();
        tracing::debug!(
            median_ms = estimator.query(false) * 1.0e3,
            last_ms = estimator.query(true) * 1.0e3,
            samples = sample_count,
            "frame time"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_valid_skips_the_next_write_slot() {
        let mut ring = CircularBuffer::new(4);
        for value in 1..=4 {
            ring.push(value);
        }
        // Cursor wrapped to slot 0, which holds the oldest value.
        let valid: Vec<_> = ring.iter_valid().collect();
        assert_eq!(valid, [4, 3, 2]);
        assert_eq!(ring.latest(), Some(4));
    }

    #[test]
    fn empty_estimator_reports_zero() {
        let estimator = FrameTimeEstimator::new();
        assert_eq!(estimator.query(false), 0.0);
        assert_eq!(estimator.query(true), 0.0);
    }

    #[test]
    fn median_of_ninety_nine_frames() {
        let mut estimator = FrameTimeEstimator::new();
        for step in 1..=99u64 {
            let milliseconds = step * 10;
            estimator.record(0, milliseconds * 1_000_000, 1.0, step as u32, None);
        }
        assert!((estimator.query(false) - 0.5).abs() < 1e-6);
        assert!((estimator.query(true) - 0.99).abs() < 1e-6);
    }

    #[test]
    fn outliers_do_not_move_the_median() {
        let mut estimator = FrameTimeEstimator::new();
        for _ in 0..20 {
            estimator.record(0, 16_000_000, 1.0, 0, None);
        }
        estimator.record(0, 2_000_000_000, 1.0, 0, None);
        assert!((estimator.query(false) - 0.016).abs() < 1e-6);
        assert!((estimator.query(true) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn tick_period_scales_duration() {
        let mut estimator = FrameTimeEstimator::new();
        let seconds = estimator.record(100, 1100, 1000.0, 0, None);
        assert!((seconds - 0.001).abs() < 1e-9);
    }

    #[test]
    fn timings_log_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("timings.txt");
        let mut log = TimingsLog::create(&path).expect("create log");
        let mut estimator = FrameTimeEstimator::new();
        estimator.record(0, 12_500_000, 1.0, 7, Some(&mut log));
        estimator.record(0, 1_000_000, 1.0, 8, Some(&mut log));
        log.close().expect("close");
        let text = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(text, "7,12.500000\n8,1.000000\n");
    }
}
