//! Unattended benchmark sweeps.
//!
//! The engine is advanced once per frame, before updates are applied. It
//! never touches GPU state itself: it tells the caller to configure an
//! experiment or to request a screenshot and observes the accumulated sample
//! count and the capture state on the following frames.

use std::fs;
use std::path::PathBuf;

use benchconfig::{Experiment, RenderSettings, SceneEntry};

use crate::frame_timer::TimingsLog;
use crate::request::UpdateRequest;

/// Per-frame captures are taken at multiples of this sample count.
pub const PER_FRAME_CAPTURE_STRIDE: u32 = 10;

const PROGRESS_STRIDE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    NotRunning,
    NewExperiment,
    Rendering,
    ScreenshotPending,
}

/// What the frame loop reports to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameObservation {
    pub sample_count: u32,
    pub capture_idle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Stage the experiment at this index and reset accumulation.
    Configure(usize),
    Capture { path: PathBuf, hdr: bool },
    /// The last experiment finished; the engine is no longer running.
    AllComplete,
}

pub struct ExperimentEngine {
    experiments: Vec<Experiment>,
    /// Index of the experiment to set up next; `len + 1` while not running.
    next: usize,
    state: EngineState,
    current: Option<usize>,
    timings: Option<TimingsLog>,
    last_capture: Option<u32>,
    last_progress: u32,
}

impl ExperimentEngine {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        let next = experiments.len() + 1;
        Self {
            experiments,
            next,
            state: EngineState::NotRunning,
            current: None,
            timings: None,
            last_capture: None,
            last_progress: 0,
        }
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn is_running(&self) -> bool {
        self.state != EngineState::NotRunning
    }

    pub fn current(&self) -> Option<&Experiment> {
        self.current.map(|index| &self.experiments[index])
    }

    /// Open timings log of the current single-shot experiment.
    pub fn timings_log_mut(&mut self) -> Option<&mut TimingsLog> {
        self.timings.as_mut()
    }

    /// Queues every experiment from the first. Returns false when the list
    /// is empty.
    pub fn start(&mut self) -> bool {
        if self.experiments.is_empty() {
            tracing::warn!("no experiments to run");
            return false;
        }
        tracing::info!(count = self.experiments.len(), "running all experiments");
        self.next = 0;
        self.state = EngineState::NewExperiment;
        true
    }

    pub fn advance(&mut self, frame: FrameObservation) -> Step {
        match self.state {
            EngineState::NotRunning => Step::Continue,
            EngineState::NewExperiment => self.begin_next(),
            EngineState::Rendering => self.observe_rendering(frame),
            EngineState::ScreenshotPending => {
                if !frame.capture_idle {
                    return Step::Continue;
                }
                let Some(experiment) = self.current() else {
                    return self.finish_current();
                };
                if experiment.per_frame_capture && frame.sample_count < experiment.sample_budget {
                    self.state = EngineState::Rendering;
                    Step::Continue
                } else {
                    self.finish_current()
                }
            }
        }
    }

    fn begin_next(&mut self) -> Step {
        let Some(experiment) = self.experiments.get(self.next) else {
            return self.stop();
        };
        let index = self.next;
        self.next += 1;

        let directory = experiment.screenshot_dir();
        if let Err(err) = fs::create_dir_all(&directory) {
            tracing::warn!(path = %directory.display(), error = %err, "failed to create screenshot directory");
        }
        self.timings = if experiment.per_frame_capture {
            None
        } else {
            let path = experiment.timings_path();
            match TimingsLog::create(&path) {
                Ok(log) => Some(log),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to open timings log");
                    None
                }
            }
        };
        tracing::info!(
            experiment = %experiment.name,
            index,
            count = self.experiments.len(),
            samples = experiment.sample_budget,
            "starting experiment"
        );

        self.current = Some(index);
        self.last_capture = None;
        self.last_progress = 0;
        self.state = EngineState::Rendering;
        Step::Configure(index)
    }

    fn observe_rendering(&mut self, frame: FrameObservation) -> Step {
        let Some(index) = self.current else {
            return self.finish_current();
        };
        let experiment = &self.experiments[index];
        let samples = frame.sample_count;

        if samples >= self.last_progress + PROGRESS_STRIDE {
            self.last_progress = samples - samples % PROGRESS_STRIDE;
            tracing::info!(experiment = %experiment.name, samples, "samples completed");
        }

        let due = if experiment.per_frame_capture {
            samples > 0 && samples % PER_FRAME_CAPTURE_STRIDE == 0 && samples <= experiment.sample_budget
        } else {
            samples >= experiment.sample_budget
        };
        if !due || self.last_capture == Some(samples) {
            return Step::Continue;
        }

        let label = if experiment.per_frame_capture {
            samples
        } else {
            experiment.sample_budget
        };
        let path = experiment.screenshot_path(label);
        let hdr = experiment.use_hdr;
        self.last_capture = Some(samples);
        self.state = EngineState::ScreenshotPending;
        Step::Capture { path, hdr }
    }

    fn finish_current(&mut self) -> Step {
        if let Some(log) = self.timings.take() {
            let path = log.path().to_path_buf();
            if let Err(err) = log.close() {
                tracing::warn!(path = %path.display(), error = %err, "failed to flush timings log");
            }
        }
        if let Some(experiment) = self.current() {
            tracing::info!(experiment = %experiment.name, "experiment complete");
        }
        if self.next >= self.experiments.len() {
            return self.stop();
        }
        self.begin_next()
    }

    fn stop(&mut self) -> Step {
        self.timings = None;
        self.current = None;
        self.next = self.experiments.len() + 1;
        self.state = EngineState::NotRunning;
        tracing::info!("all experiments complete");
        Step::AllComplete
    }
}

/// The scene, quicksave and settings the renderer currently uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConfiguration {
    pub scene_key: String,
    pub scene: SceneEntry,
    pub quicksave: PathBuf,
    pub settings: RenderSettings,
}

impl ActiveConfiguration {
    pub fn from_experiment(experiment: &Experiment) -> Self {
        Self {
            scene_key: experiment.scene_key.clone(),
            scene: experiment.scene.clone(),
            quicksave: experiment.quicksave.clone(),
            settings: experiment.settings.clone(),
        }
    }

    /// Switches to `experiment`, recording in `request` everything the
    /// switch invalidates.
    pub fn stage(&mut self, experiment: &Experiment, request: &mut UpdateRequest) {
        request.requested_size = Some((experiment.width, experiment.height));
        if self.scene_key != experiment.scene_key {
            self.scene_key = experiment.scene_key.clone();
            self.scene = experiment.scene.clone();
            request.scene_reload = true;
        }
        self.quicksave = experiment.quicksave.clone();
        request.quick_load = true;
        if self.settings.v_sync != experiment.settings.v_sync {
            request.window_resize = true;
        }
        request.shading_changed = true;
        self.settings = experiment.settings.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experiment(name: &str, scene: &str, budget: u32, per_frame: bool, base: &std::path::Path) -> Experiment {
        let catalog = benchconfig::builtin_scenes();
        let entry = catalog[scene].clone();
        Experiment {
            name: name.into(),
            scene_key: scene.into(),
            quicksave: entry.quicksave.clone(),
            scene: entry,
            width: 640,
            height: 360,
            settings: RenderSettings::default(),
            sample_budget: budget,
            base_dir: base.to_path_buf(),
            use_hdr: false,
            per_frame_capture: per_frame,
        }
    }

    fn observe(sample_count: u32) -> FrameObservation {
        FrameObservation {
            sample_count,
            capture_idle: true,
        }
    }

    #[test]
    fn idle_engine_does_nothing() {
        let mut engine = ExperimentEngine::new(Vec::new());
        assert!(!engine.start());
        assert_eq!(engine.advance(observe(0)), Step::Continue);
        assert!(!engine.is_running());
    }

    #[test]
    fn single_shot_waits_for_capture_before_advancing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = ExperimentEngine::new(vec![
            experiment("a", "zero-day", 3, false, dir.path()),
            experiment("b", "zero-day", 3, false, dir.path()),
        ]);
        engine.start();
        assert_eq!(engine.advance(observe(0)), Step::Configure(0));
        assert!(dir.path().join("a").is_dir());
        assert!(engine.timings_log_mut().is_some());
        assert_eq!(engine.advance(observe(2)), Step::Continue);
        assert!(matches!(engine.advance(observe(3)), Step::Capture { .. }));

        let busy = FrameObservation {
            sample_count: 3,
            capture_idle: false,
        };
        assert_eq!(engine.advance(busy), Step::Continue);
        assert_eq!(engine.current().map(|e| e.name.as_str()), Some("a"));

        assert_eq!(engine.advance(observe(4)), Step::Configure(1));
        assert!(dir.path().join("a/timings.txt").is_file());
        assert_eq!(engine.current().map(|e| e.name.as_str()), Some("b"));
    }

    #[test]
    fn staging_flags_only_what_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = experiment("a", "zero-day", 3, false, dir.path());
        let mut second = experiment("b", "bistro-exterior", 3, false, dir.path());
        second.settings.v_sync = true;

        let mut active = ActiveConfiguration::from_experiment(&first);
        let mut request = UpdateRequest::default();
        active.stage(&first, &mut request);
        assert!(!request.scene_reload);
        assert!(!request.window_resize);
        assert!(request.quick_load && request.shading_changed);
        assert_eq!(request.requested_size, Some((640, 360)));

        let mut request = UpdateRequest::default();
        active.stage(&second, &mut request);
        assert!(request.scene_reload);
        assert!(request.window_resize);
        assert_eq!(active.scene_key, "bistro-exterior");
        assert!(active.settings.v_sync);
    }
}
