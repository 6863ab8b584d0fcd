//! Heads-up display drawn by the UI stage.
//!
//! The HUD is a handful of solid rectangles: sample progress, frame time and
//! one swatch per toggle. It is turned into an indexed triangle list plus
//! per-widget scissor rectangles, the same shape any immediate-mode UI
//! library hands to a renderer.

use std::ops::Range;

use benchconfig::{PolygonSampling, RenderSettings};
use bytemuck::{Pod, Zeroable};

const PANEL_ORIGIN: [f32; 2] = [12.0, 12.0];
const PANEL_WIDTH: f32 = 240.0;
const BAR_HEIGHT: f32 = 10.0;
const SWATCH_SIZE: f32 = 14.0;
const SPACING: f32 = 6.0;
/// Frame time that fills the frame-time bar.
const FRAME_TIME_SCALE_MS: f32 = 33.3;
/// Samples per revolution of the progress bar when there is no budget.
const OPEN_ENDED_PERIOD: u32 = 1000;

const BACKGROUND: [f32; 4] = [0.05, 0.05, 0.06, 0.75];
const TRACK: [f32; 4] = [0.2, 0.2, 0.22, 1.0];
const PROGRESS: [f32; 4] = [0.3, 0.65, 1.0, 1.0];
const FRAME_TIME: [f32; 4] = [1.0, 0.7, 0.25, 1.0];
const ENABLED: [f32; 4] = [0.35, 0.85, 0.4, 1.0];
const DISABLED: [f32; 4] = [0.55, 0.18, 0.18, 1.0];
const SELECTED: [f32; 4] = [0.95, 0.95, 0.95, 1.0];
const UNSELECTED: [f32; 4] = [0.35, 0.35, 0.38, 1.0];

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct UiVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

/// Pixel rectangle; `x`, `y`, `width`, `height`.
pub(crate) type ScissorRect = [u32; 4];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UiDrawCommand {
    pub scissor: ScissorRect,
    pub indices: Range<u32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct UiDrawList {
    pub vertices: Vec<UiVertex>,
    pub indices: Vec<u32>,
    pub commands: Vec<UiDrawCommand>,
}

impl UiDrawList {
    fn begin(&self) -> u32 {
        self.indices.len() as u32
    }

    fn rect(&mut self, origin: [f32; 2], size: [f32; 2], color: [f32; 4]) {
        let base = self.vertices.len() as u32;
        let [x, y] = origin;
        let [w, h] = size;
        for position in [[x, y], [x + w, y], [x + w, y + h], [x, y + h]] {
            self.vertices.push(UiVertex { position, color });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    fn end(&mut self, start: u32, clip_origin: [f32; 2], clip_size: [f32; 2]) {
        let end = self.indices.len() as u32;
        if end > start {
            self.commands.push(UiDrawCommand {
                scissor: [
                    clip_origin[0].max(0.0) as u32,
                    clip_origin[1].max(0.0) as u32,
                    clip_size[0].ceil() as u32,
                    clip_size[1].ceil() as u32,
                ],
                indices: start..end,
            });
        }
    }
}

pub(crate) struct HudState<'a> {
    pub settings: &'a RenderSettings,
    pub sample_count: u32,
    pub sample_budget: Option<u32>,
    pub frame_time_ms: Option<f32>,
}

fn technique_index(technique: PolygonSampling) -> usize {
    match technique {
        PolygonSampling::Baseline => 0,
        PolygonSampling::AreaTurk => 1,
        PolygonSampling::ProjectedSolidAngle => 2,
        PolygonSampling::ProjectedSolidAngleBiased => 3,
        PolygonSampling::LtcCp => 4,
    }
}

pub(crate) fn build_draw_list(state: &HudState<'_>) -> UiDrawList {
    let mut list = UiDrawList::default();
    let [x, mut y] = PANEL_ORIGIN;
    let inner = PANEL_WIDTH - 2.0 * SPACING;
    let panel_height = 2.0 * (BAR_HEIGHT + SPACING) + 2.0 * (SWATCH_SIZE + SPACING) + SPACING;

    let start = list.begin();
    list.rect([x, y], [PANEL_WIDTH, panel_height], BACKGROUND);
    list.end(start, [x, y], [PANEL_WIDTH, panel_height]);
    y += SPACING;

    let progress = match state.sample_budget {
        Some(budget) if budget > 0 => (state.sample_count as f32 / budget as f32).min(1.0),
        _ => (state.sample_count % OPEN_ENDED_PERIOD) as f32 / OPEN_ENDED_PERIOD as f32,
    };
    bar(&mut list, [x + SPACING, y], inner, progress, PROGRESS);
    y += BAR_HEIGHT + SPACING;

    let frame_time = state.frame_time_ms.unwrap_or(0.0) / FRAME_TIME_SCALE_MS;
    bar(&mut list, [x + SPACING, y], inner, frame_time.clamp(0.0, 1.0), FRAME_TIME);
    y += BAR_HEIGHT + SPACING;

    let settings = state.settings;
    let toggles = [
        settings.accumulate,
        settings.v_sync,
        settings.animate_noise,
        settings.show_polygonal_lights,
        settings.fast_atan,
    ];
    let start = list.begin();
    for (i, enabled) in toggles.into_iter().enumerate() {
        let color = if enabled { ENABLED } else { DISABLED };
        list.rect(swatch_origin(x, y, i), [SWATCH_SIZE, SWATCH_SIZE], color);
    }
    list.end(start, [x, y], [PANEL_WIDTH, SWATCH_SIZE]);
    y += SWATCH_SIZE + SPACING;

    let selected = technique_index(settings.polygon_sampling);
    let start = list.begin();
    for i in 0..5 {
        let color = if i == selected { SELECTED } else { UNSELECTED };
        list.rect(swatch_origin(x, y, i), [SWATCH_SIZE, SWATCH_SIZE], color);
    }
    list.end(start, [x, y], [PANEL_WIDTH, SWATCH_SIZE]);

    list
}

fn swatch_origin(x: f32, y: f32, index: usize) -> [f32; 2] {
    [x + SPACING + index as f32 * (SWATCH_SIZE + SPACING), y]
}

/// Track plus fill. The fill is drawn at full width and clipped by the
/// scissor rectangle.
fn bar(list: &mut UiDrawList, origin: [f32; 2], width: f32, fraction: f32, color: [f32; 4]) {
    let start = list.begin();
    list.rect(origin, [width, BAR_HEIGHT], TRACK);
    list.end(start, origin, [width, BAR_HEIGHT]);

    let filled = width * fraction;
    if filled >= 1.0 {
        let start = list.begin();
        list.rect(origin, [width, BAR_HEIGHT], color);
        list.end(start, origin, [filled, BAR_HEIGHT]);
    }
}

/// Restricts `rect` to a `width` by `height` surface. `None` when nothing
/// of it remains visible.
pub(crate) fn clamp_scissor(rect: ScissorRect, width: u32, height: u32) -> Option<ScissorRect> {
    let [x, y, w, h] = rect;
    if x >= width || y >= height {
        return None;
    }
    let w = w.min(width - x);
    let h = h.min(height - y);
    (w > 0 && h > 0).then_some([x, y, w, h])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(settings: &RenderSettings, samples: u32, budget: Option<u32>) -> HudState<'_> {
        HudState {
            settings,
            sample_count: samples,
            sample_budget: budget,
            frame_time_ms: Some(16.0),
        }
    }

    #[test]
    fn commands_cover_every_index_once() {
        let settings = RenderSettings::default();
        let list = build_draw_list(&state(&settings, 500, Some(1000)));
        let mut next = 0;
        for command in &list.commands {
            assert_eq!(command.indices.start, next);
            next = command.indices.end;
        }
        assert_eq!(next as usize, list.indices.len());
        assert!(list.indices.iter().all(|&i| (i as usize) < list.vertices.len()));
    }

    #[test]
    fn progress_fill_is_clipped_to_the_fraction() {
        let settings = RenderSettings::default();
        let list = build_draw_list(&state(&settings, 500, Some(1000)));
        // background, progress track, progress fill
        let fill = &list.commands[2];
        let track = &list.commands[1];
        assert_eq!(fill.scissor[2], (track.scissor[2] as f32 / 2.0).ceil() as u32);

        let empty = build_draw_list(&state(&settings, 0, Some(1000)));
        assert_eq!(empty.commands.len(), list.commands.len() - 1);
    }

    #[test]
    fn scissors_are_clamped_to_the_surface() {
        assert_eq!(clamp_scissor([10, 10, 100, 100], 50, 200), Some([10, 10, 40, 100]));
        assert_eq!(clamp_scissor([60, 0, 10, 10], 50, 50), None);
    }
}
