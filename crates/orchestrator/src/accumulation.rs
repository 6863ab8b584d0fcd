//! The five-stage frame and its sample-accumulation contract.
//!
//! Stage order is visibility, shading, accumulate, copy and UI. The
//! accumulate stage of the frame rendered into image slot `i` reads the
//! accumulation target of the slot rendered just before it, so the running
//! average ping-pongs across per-slot buffers instead of sharing one.

use std::fmt;

use crate::graph::ApplyOutcome;

/// Which byte plane of the half-precision result the copy stage writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureByte {
    /// Regular tonemapped 8-bit output.
    #[default]
    None,
    Low,
    High,
}

impl CaptureByte {
    /// Packing mode constant handed to the copy stage.
    pub fn code(self) -> u32 {
        match self {
            CaptureByte::None => 0,
            CaptureByte::Low => 1,
            CaptureByte::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccumulationState {
    sample_count: u32,
}

impl AccumulationState {
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn reset(&mut self) {
        self.sample_count = 0;
    }

    /// Restarts the average iff the update reported a change. Returns
    /// whether it did.
    pub fn apply_update(&mut self, outcome: &ApplyOutcome) -> bool {
        if outcome.reset_accumulation {
            self.reset();
        }
        outcome.reset_accumulation
    }

    /// Advances after a presented frame. `pending` is the byte plane the
    /// next frame will capture; while the high plane is pending the count
    /// stays put so both planes see the same average. The low plane and LDR
    /// captures do not hold the count.
    pub fn advance(&mut self, accumulate: bool, pending: CaptureByte) -> bool {
        if accumulate && pending != CaptureByte::High {
            self.sample_count += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Visibility,
    Shading,
    Accumulate,
    Copy,
    Ui,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Visibility => "visibility",
            Stage::Shading => "shading",
            Stage::Accumulate => "accumulate",
            Stage::Copy => "copy",
            Stage::Ui => "ui",
        })
    }
}

/// What one frame records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub image_index: usize,
    /// Slot whose accumulation target holds the previous average.
    pub previous_index: usize,
    pub sample_count: u32,
    pub capture_byte: CaptureByte,
    /// False while the high byte plane is captured: the accumulate stage
    /// then passes the previous average through unchanged, so both planes
    /// of an HDR capture encode the same image.
    pub new_sample: bool,
    pub draw_ui: bool,
}

impl FramePlan {
    /// `previous_index` is the slot presented last, or `image_index` for
    /// the first frame after a rebuild.
    pub fn new(
        image_index: usize,
        previous_index: Option<usize>,
        state: &AccumulationState,
        capture_byte: CaptureByte,
        show_ui: bool,
    ) -> Self {
        Self {
            image_index,
            previous_index: previous_index.unwrap_or(image_index),
            sample_count: state.sample_count(),
            capture_byte,
            new_sample: capture_byte != CaptureByte::High || previous_index.is_none(),
            draw_ui: show_ui && capture_byte == CaptureByte::None,
        }
    }

    /// Weight of this frame's shading estimate in the running average.
    pub fn blend_weight(&self) -> f32 {
        if self.new_sample {
            1.0 / (self.sample_count as f32 + 1.0)
        } else {
            0.0
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> {
        let ui = self.draw_ui.then_some(Stage::Ui);
        [Stage::Visibility, Stage::Shading, Stage::Accumulate, Stage::Copy]
            .into_iter()
            .chain(ui)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    Depth,
    /// Per-pixel primitive identifiers.
    Visibility,
    /// One frame's shading estimate.
    Shading,
    /// Running average over `sample_count` frames.
    Accumulation,
}

impl TargetRole {
    pub const ALL: [TargetRole; 4] = [
        TargetRole::Depth,
        TargetRole::Visibility,
        TargetRole::Shading,
        TargetRole::Accumulation,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// The render targets of one image slot, addressable by role or in order.
#[derive(Debug, Clone)]
pub struct SlotTargets<T> {
    targets: [T; 4],
}

impl<T> SlotTargets<T> {
    pub fn try_from_fn<E>(mut create: impl FnMut(TargetRole) -> Result<T, E>) -> Result<Self, E> {
        let [depth, visibility, shading, accumulation] = TargetRole::ALL;
        Ok(Self {
            targets: [
                create(depth)?,
                create(visibility)?,
                create(shading)?,
                create(accumulation)?,
            ],
        })
    }

    pub fn get(&self, role: TargetRole) -> &T {
        &self.targets[role.index()]
    }

    pub fn depth(&self) -> &T {
        self.get(TargetRole::Depth)
    }

    pub fn visibility(&self) -> &T {
        self.get(TargetRole::Visibility)
    }

    pub fn shading(&self) -> &T {
        self.get(TargetRole::Shading)
    }

    pub fn accumulation(&self) -> &T {
        self.get(TargetRole::Accumulation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetRole, &T)> {
        TargetRole::ALL.into_iter().zip(self.targets.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_one_sample_per_frame() {
        let mut state = AccumulationState::default();
        for _ in 0..5 {
            assert!(state.advance(true, CaptureByte::None));
        }
        assert_eq!(state.sample_count(), 5);
        state.reset();
        assert_eq!(state.sample_count(), 0);
    }

    #[test]
    fn pending_high_plane_holds_the_count() {
        let mut state = AccumulationState::default();
        state.advance(true, CaptureByte::None);
        assert!(!state.advance(true, CaptureByte::High));
        assert_eq!(state.sample_count(), 1);
        assert!(state.advance(true, CaptureByte::Low));
        assert!(!state.advance(false, CaptureByte::None));
        assert_eq!(state.sample_count(), 2);
    }

    #[test]
    fn ui_is_skipped_during_hdr_capture() {
        let state = AccumulationState::default();
        let plan = FramePlan::new(1, Some(0), &state, CaptureByte::Low, true);
        assert!(!plan.draw_ui);
        assert_eq!(plan.stages().last(), Some(Stage::Copy));

        let plan = FramePlan::new(1, None, &state, CaptureByte::None, true);
        assert_eq!(plan.previous_index, 1);
        assert_eq!(plan.stages().count(), 5);
    }

    #[test]
    fn high_plane_frame_repeats_the_previous_average() {
        let mut state = AccumulationState::default();
        for _ in 0..3 {
            state.advance(true, CaptureByte::None);
        }
        let low = FramePlan::new(0, Some(2), &state, CaptureByte::Low, false);
        assert!(low.new_sample);
        assert_eq!(low.blend_weight(), 0.25);

        assert!(!state.advance(true, CaptureByte::High));
        let high = FramePlan::new(1, Some(0), &state, CaptureByte::High, false);
        assert!(!high.new_sample);
        assert_eq!(high.blend_weight(), 0.0);
        assert_eq!(high.previous_index, low.image_index);
        assert_eq!(high.sample_count, low.sample_count);
    }

    #[test]
    fn first_frame_after_reset_ignores_the_previous_average() {
        let state = AccumulationState::default();
        let plan = FramePlan::new(2, None, &state, CaptureByte::None, false);
        assert_eq!(plan.blend_weight(), 1.0);
        let plan = FramePlan::new(2, None, &state, CaptureByte::High, false);
        assert!(plan.new_sample);
    }

    #[test]
    fn slot_targets_by_role() {
        let targets = SlotTargets::try_from_fn(|role| Ok::<_, ()>(format!("{role:?}"))).expect("targets");
        assert_eq!(targets.accumulation(), "Accumulation");
        assert_eq!(targets.depth(), "Depth");
        let roles: Vec<_> = targets.iter().map(|(role, _)| role).collect();
        assert_eq!(roles, TargetRole::ALL);
    }
}
