use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use orchestrator::{
    ActiveConfiguration, ExperimentEngine, FrameObservation, FrameOutcome, FrameTimeEstimator,
    FrameTimeReport, ResourceDependencyGraph, Step, UpdateRequest,
};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::config::{RendererConfig, RunSummary};
use crate::input::{Hotkey, HotkeyQueue};
use crate::session::Session;

const LDR_SCREENSHOT: &str = "data/screenshot.png";
const HDR_SCREENSHOT: &str = "data/screenshot.hdr";

/// Per-frame driver: input, experiment automation, resource updates and
/// rendering, in that order.
struct App {
    session: Session,
    graph: ResourceDependencyGraph,
    engine: ExperimentEngine,
    estimator: FrameTimeEstimator,
    report: FrameTimeReport,
    hotkeys: HotkeyQueue,
    run_experiments: bool,
    exit_requested: bool,
    summary: RunSummary,
}

impl App {
    fn new(session: Session, config: &RendererConfig) -> Result<Self> {
        let graph = ResourceDependencyGraph::new()?;
        let mut engine = ExperimentEngine::new(config.experiments.clone());
        if config.run_experiments && !engine.start() {
            anyhow::bail!("no experiments to run");
        }
        Ok(Self {
            session,
            graph,
            engine,
            estimator: FrameTimeEstimator::new(),
            report: FrameTimeReport::new(config.report_interval),
            hotkeys: HotkeyQueue::default(),
            run_experiments: config.run_experiments,
            exit_requested: false,
            summary: RunSummary::default(),
        })
    }

    /// Builds every resource and loads the active quicksave. Any failure
    /// here ends the session before the first frame.
    fn start(&mut self) -> Result<()> {
        let request = UpdateRequest {
            quick_load: true,
            ..UpdateRequest::startup()
        };
        let outcome = self.graph.apply(request, &mut self.session)?;
        if outcome.minimized {
            tracing::info!("window minimized at startup; resources will be built once it is visible");
        }
        self.session.frame.apply_update(&outcome);
        Ok(())
    }

    fn gather_input(&mut self) -> UpdateRequest {
        let mut request = UpdateRequest::default();
        let frame = &mut self.session.frame;
        for hotkey in self.hotkeys.drain() {
            tracing::debug!(?hotkey, "hotkey");
            match hotkey {
                Hotkey::Quit => self.exit_requested = true,
                Hotkey::ToggleGui => frame.active.settings.show_gui = !frame.active.settings.show_gui,
                Hotkey::ToggleVsync => {
                    frame.active.settings.v_sync = !frame.active.settings.v_sync;
                    tracing::info!(v_sync = frame.active.settings.v_sync, "toggled vsync");
                    request.window_resize = true;
                }
                Hotkey::QuickSave => request.quick_save = true,
                Hotkey::QuickLoad => request.quick_load = true,
                Hotkey::ReloadShaders => {
                    tracing::info!("reloading shaders");
                    request.reload_shaders = true;
                }
                Hotkey::ScreenshotLdr => {
                    if frame.capture.request(Some(PathBuf::from(LDR_SCREENSHOT)), None, None).is_ok() {
                        tracing::info!(path = LDR_SCREENSHOT, "screenshot requested");
                    }
                }
                Hotkey::ScreenshotHdr => {
                    if frame.capture.request(None, None, Some(PathBuf::from(HDR_SCREENSHOT))).is_ok() {
                        tracing::info!(path = HDR_SCREENSHOT, "HDR screenshot requested");
                    }
                }
            }
        }
        request
    }

    /// Advances the experiment engine by one frame. Returns the resource
    /// changes a newly configured experiment needs.
    fn run_automation(&mut self) -> UpdateRequest {
        let mut request = UpdateRequest::default();
        let frame = &mut self.session.frame;
        let observation = FrameObservation {
            sample_count: frame.accumulation.sample_count(),
            capture_idle: frame.capture.is_idle(),
        };
        match self.engine.advance(observation) {
            Step::Continue => {}
            Step::Configure(index) => {
                let Some(experiment) = self.engine.experiments().get(index) else {
                    return request;
                };
                frame.active.stage(experiment, &mut request);
                frame.sample_budget = Some(experiment.sample_budget);
                frame.reset_accumulation();
                self.estimator.reset();
            }
            Step::Capture { path, hdr } => {
                let result = if hdr {
                    frame.capture.request(None, None, Some(path))
                } else {
                    frame.capture.request(Some(path), None, None)
                };
                if result.is_err() {
                    tracing::warn!("automated capture could not be scheduled");
                }
            }
            Step::AllComplete => {
                frame.sample_budget = None;
                if self.run_experiments {
                    self.summary.experiments_completed = true;
                    self.exit_requested = true;
                }
            }
        }
        request
    }

    /// One iteration of the frame loop. An error ends the session.
    fn frame(&mut self) -> Result<()> {
        let mut request = self.gather_input();
        if self.session.take_recreate_request() {
            request.window_resize = true;
        }
        request.merge(self.run_automation());
        if self.exit_requested {
            return Ok(());
        }

        let outcome = self.graph.apply(request, &mut self.session)?;
        self.session.frame.apply_update(&outcome);
        if outcome.minimized || self.graph.has_pending() {
            return Ok(());
        }

        match self.session.render_frame()? {
            Some(FrameOutcome::Rendered { .. }) => self.summary.frames_rendered += 1,
            Some(FrameOutcome::Skipped) | None => return Ok(()),
        }

        if let Some(timing) = self.session.frame.take_timing() {
            let seconds = self.estimator.record(
                timing.start_tick,
                timing.end_tick,
                timing.tick_period_ns,
                timing.sample_index,
                self.engine.timings_log_mut(),
            );
            self.session.frame.frame_time_ms = Some(seconds * 1000.0);
        }
        self.report
            .maybe_report(&self.estimator, self.session.frame.accumulation.sample_count());
        Ok(())
    }
}

/// Opens the benchmark window and renders until it is closed, Escape is
/// pressed or the queued experiments are done.
pub(crate) fn run_window(config: RendererConfig) -> Result<RunSummary> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = config.window_size;
    let window = WindowBuilder::new()
        .with_title(window_title(&config.initial))
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let session = Session::new(window, config.shader_dir.clone(), config.initial.clone())?;
    let mut app = App::new(session, &config)?;
    app.start()?;

    let mut result = Ok(());
    let run_result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { window_id, event } if window_id == app.session.window().id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. } => app.hotkeys.handle_event(&event),
                WindowEvent::Resized(size) => app.session.window_resized(size),
                WindowEvent::RedrawRequested => {
                    if let Err(err) = app.frame() {
                        tracing::error!(error = %format!("{err:#}"), "renderer stopped");
                        result = Err(err);
                        elwt.exit();
                    } else if app.exit_requested {
                        elwt.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => app.session.window().request_redraw(),
            Event::LoopExiting => app.session.shutdown(),
            _ => {}
        }
    });

    if let Err(err) = run_result {
        result = Err(anyhow!("window event loop error: {err}"));
    }
    result.map(|()| app.summary)
}

fn window_title(active: &ActiveConfiguration) -> String {
    format!("polybench: {}", active.scene.name)
}
