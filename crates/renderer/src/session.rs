//! GPU session: every rebuildable resource and the per-frame recording.
//!
//! [`Session`] is the [`ResourceHost`] the dependency graph drives; it owns
//! the window, the device context and the frame scheduler. [`FrameState`]
//! is the [`FramePipeline`] the scheduler calls back into. The two are kept
//! apart so the scheduler can borrow the device and the pipeline at once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use orchestrator::{
    quicksave, AccumulationState, ActiveConfiguration, ApplyOutcome, CaptureProgress, FrameInFlightScheduler,
    FrameOutcome, FramePipeline, FramePlan, QuickLoadChanges, ResourceHost, ResourceKind,
    SceneState, ScreenshotCapture, Stage, SurfaceStatus,
};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::compile::ShaderCompiler;
use crate::context::GpuContext;
use crate::frame::{FrameRecording, FrameSync, SurfaceReadback};
use crate::hud::{build_draw_list, HudState};
use crate::lights::{LightBuffers, LightTextures};
use crate::scene::SceneGeometry;
use crate::stages::{
    AccumulateStage, CopyStage, GeometryStage, ShadingInputs, ShadingStage, StageContext, UiStage,
};
use crate::tables::NoiseTable;
use crate::targets::{RenderPassLayout, RenderTargets};
use crate::timing::{FrameTag, FrameTimer, FrameTiming};
use crate::uniforms::{ConstantBuffers, FrameConstants, FrameInputs, NoiseRandomizer};

const NOISE_SEED: u64 = 0x5eed_2a11;

/// One slot per [`ResourceKind`] except the surface and the scheduler,
/// which live on [`Session`].
#[derive(Default)]
struct Resources {
    noise: Option<NoiseTable>,
    geometry: Option<SceneGeometry>,
    targets: Option<RenderTargets>,
    pass_layout: Option<RenderPassLayout>,
    constants: Option<ConstantBuffers>,
    light_buffers: Option<LightBuffers>,
    light_textures: Option<LightTextures>,
    geometry_stage: Option<GeometryStage>,
    shading_stage: Option<ShadingStage>,
    accumulate_stage: Option<AccumulateStage>,
    copy_stage: Option<CopyStage>,
    ui_stage: Option<UiStage>,
}

fn require<T>(slot: &Option<T>, kind: ResourceKind) -> Result<&T> {
    slot.as_ref()
        .with_context(|| format!("{kind} used before it was created"))
}

#[derive(Debug, Clone, Copy)]
struct RecordedFrame {
    image_index: usize,
    tag: FrameTag,
    /// Timestamps were written for this frame.
    timed: bool,
}

pub(crate) struct FrameState {
    resources: Resources,
    pub active: ActiveConfiguration,
    pub scene: SceneState,
    pub accumulation: AccumulationState,
    pub capture: ScreenshotCapture,
    noise: NoiseRandomizer,
    last_presented: Option<usize>,
    recorded: Option<RecordedFrame>,
    timer: FrameTimer,
    timing: Option<FrameTiming>,
    /// Bumped on every accumulation reset so stale timings are dropped.
    generation: u64,
    pub sample_budget: Option<u32>,
    pub frame_time_ms: Option<f32>,
}

impl FrameState {
    fn new(active: ActiveConfiguration, timer: FrameTimer) -> Self {
        Self {
            resources: Resources::default(),
            active,
            scene: SceneState::default(),
            accumulation: AccumulationState::default(),
            capture: ScreenshotCapture::new(),
            noise: NoiseRandomizer::new(NOISE_SEED),
            last_presented: None,
            recorded: None,
            timer,
            timing: None,
            generation: 0,
            sample_budget: None,
            frame_time_ms: None,
        }
    }

    /// Restarts the running average. The next frame ignores whatever the
    /// accumulation targets hold.
    pub fn reset_accumulation(&mut self) {
        self.accumulation.reset();
        self.restart();
    }

    /// Resets the running average if the resource update asks for it.
    pub fn apply_update(&mut self, outcome: &ApplyOutcome) {
        if self.accumulation.apply_update(outcome) {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.last_presented = None;
        self.generation += 1;
        self.timing = None;
    }

    /// Most recent completed frame timing, consumed once.
    pub fn take_timing(&mut self) -> Option<FrameTiming> {
        self.timing.take()
    }

    fn tag(&self) -> FrameTag {
        FrameTag {
            sample_index: self.accumulation.sample_count(),
            generation: self.generation,
        }
    }

    fn keep_timing(&mut self, measured: Option<(FrameTiming, FrameTag)>) {
        if let Some((timing, tag)) = measured {
            if tag.generation == self.generation {
                self.timing = Some(timing);
            }
        }
    }
}

impl FramePipeline<GpuContext> for FrameState {
    fn record(
        &mut self,
        gpu: &mut GpuContext,
        recording: &mut FrameRecording,
        sync: &FrameSync,
        image_index: usize,
    ) -> Result<()> {
        // The slot's previous frame has completed, so its timestamps are in.
        let measured = match &mut self.timer {
            FrameTimer::Gpu(timer) => timer.collect(image_index),
            FrameTimer::Acquire(_) => None,
        };
        self.keep_timing(measured);
        let surface_view = sync.view().context("no acquired surface image")?;
        let res = &self.resources;
        let targets = require(&res.targets, ResourceKind::RenderTargets)?;
        anyhow::ensure!(
            image_index < targets.slot_count(),
            "image {image_index} has no render targets ({} slots)",
            targets.slot_count()
        );
        let settings = &self.active.settings;
        let plan = FramePlan::new(
            image_index,
            self.last_presented,
            &self.accumulation,
            self.capture.capture_byte(),
            settings.show_gui,
        );

        let constants = FrameConstants::new(&FrameInputs {
            camera: &self.scene.camera,
            extent: targets.extent,
            settings,
            sample_count: plan.sample_count,
            blend_weight: plan.blend_weight(),
            capture_byte: plan.capture_byte,
            light_count: self.scene.lights.len(),
            noise_random: self.noise.next(settings.animate_noise),
        });
        require(&res.constants, ResourceKind::ConstantBuffers)?.write(&gpu.queue, image_index, &constants);
        require(&res.light_buffers, ResourceKind::LightBuffers)?.write(
            &gpu.queue,
            &self.scene,
            require(&res.light_textures, ResourceKind::LightTextures)?,
        );

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        let timed = match &self.timer {
            FrameTimer::Gpu(timer) => timer.begin(&mut encoder, image_index),
            FrameTimer::Acquire(_) => false,
        };
        for stage in plan.stages() {
            match stage {
                Stage::Visibility => require(&res.geometry_stage, ResourceKind::GeometryStage)?.encode(
                    &mut encoder,
                    targets,
                    require(&res.geometry, ResourceKind::Scene)?,
                    image_index,
                ),
                Stage::Shading => {
                    require(&res.shading_stage, ResourceKind::ShadingStage)?.encode(&mut encoder, targets, image_index)
                }
                Stage::Accumulate => require(&res.accumulate_stage, ResourceKind::AccumulateStage)?.encode(
                    &mut encoder,
                    targets,
                    image_index,
                    plan.previous_index,
                )?,
                Stage::Copy => {
                    require(&res.copy_stage, ResourceKind::CopyStage)?.encode(&mut encoder, surface_view, image_index)
                }
                Stage::Ui => {
                    let list = build_draw_list(&HudState {
                        settings,
                        sample_count: plan.sample_count,
                        sample_budget: self.sample_budget,
                        frame_time_ms: self.frame_time_ms,
                    });
                    require(&res.ui_stage, ResourceKind::UiStage)?.encode(
                        &mut encoder,
                        &gpu.queue,
                        surface_view,
                        gpu.extent(),
                        image_index,
                        &list,
                    );
                }
            }
        }
        if timed {
            if let FrameTimer::Gpu(timer) = &self.timer {
                timer.end(&mut encoder, image_index);
            }
        }
        recording.set(encoder.finish());
        self.recorded = Some(RecordedFrame {
            image_index,
            tag: self.tag(),
            timed,
        });
        Ok(())
    }

    fn after_submit(&mut self, gpu: &mut GpuContext, sync: &FrameSync, image_index: usize) {
        if let Some(recorded) = self.recorded {
            let measured = match &mut self.timer {
                FrameTimer::Gpu(timer) => {
                    if recorded.timed {
                        timer.submitted(image_index, recorded.tag);
                    }
                    None
                }
                FrameTimer::Acquire(clock) => sync.acquired_at.and_then(|acquired| clock.lap(acquired, recorded.tag)),
            };
            self.keep_timing(measured);
        }

        let mut source = SurfaceReadback {
            gpu,
            texture: sync.texture(),
        };
        match self.capture.process_frame(&mut source, image_index) {
            CaptureProgress::Completed(paths) => {
                tracing::debug!(files = paths.len(), "capture finished");
            }
            CaptureProgress::AwaitingHighBytes => {
                tracing::debug!("low byte plane stored; rendering high byte plane");
            }
            CaptureProgress::Idle | CaptureProgress::Failed => {}
        }
    }

    fn after_present(&mut self, presented: bool) {
        if let Some(recorded) = self.recorded.take() {
            self.last_presented = Some(recorded.image_index);
        }
        if !presented {
            tracing::debug!("present failed; surface will be recreated");
        }
        self.accumulation
            .advance(self.active.settings.accumulate, self.capture.capture_byte());
    }
}

/// Fields drop in declaration order: the surface must go before the window.
pub(crate) struct Session {
    scheduler: Option<FrameInFlightScheduler<GpuContext>>,
    pub frame: FrameState,
    gpu: GpuContext,
    compiler: ShaderCompiler,
    /// Drawable size asked for by an experiment, used instead of the window
    /// size until the window settles on something else.
    requested_extent: Option<(u32, u32)>,
    window: Arc<Window>,
}

impl Session {
    pub fn new(window: Arc<Window>, shader_dir: PathBuf, active: ActiveConfiguration) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuContext::new(window.as_ref(), size, active.settings.v_sync)?;
        let timer = FrameTimer::new(&gpu.device, gpu.slot_count(), gpu.timestamp_period);
        Ok(Self {
            scheduler: None,
            frame: FrameState::new(active, timer),
            gpu,
            compiler: ShaderCompiler::new(shader_dir),
            requested_extent: None,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// A window size change that does not match a pending request cancels it.
    pub fn window_resized(&mut self, size: PhysicalSize<u32>) {
        if let Some(requested) = self.requested_extent {
            if requested != (size.width, size.height) {
                tracing::debug!(
                    requested = ?requested,
                    actual = ?(size.width, size.height),
                    "window size differs from the requested extent"
                );
                self.requested_extent = None;
            }
        }
    }

    /// The scheduler asked for the surface to be recreated.
    pub fn take_recreate_request(&mut self) -> bool {
        self.scheduler
            .as_mut()
            .map(FrameInFlightScheduler::take_recreate_request)
            .unwrap_or(false)
    }

    /// Renders one frame if every resource is in place. `None` when the
    /// frame scheduler does not exist yet.
    pub fn render_frame(&mut self) -> Result<Option<FrameOutcome>> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(None);
        };
        let outcome = scheduler.render_one_frame(&mut self.gpu, &mut self.frame)?;
        Ok(Some(outcome))
    }

    pub fn shutdown(&mut self) {
        if let Err(err) = self.wait_idle() {
            tracing::warn!(error = %format!("{err:#}"), "failed to drain GPU work on shutdown");
        }
    }

    fn stage_context(&self) -> Result<StageContext<'_>> {
        let res = &self.frame.resources;
        Ok(StageContext {
            device: &self.gpu.device,
            compiler: &self.compiler,
            layout: require(&res.pass_layout, ResourceKind::RenderPass)?,
            constants: require(&res.constants, ResourceKind::ConstantBuffers)?,
            targets: require(&res.targets, ResourceKind::RenderTargets)?,
        })
    }

    fn create_shading_stage(&self) -> Result<ShadingStage> {
        let res = &self.frame.resources;
        let settings = &self.frame.active.settings;
        let mut defines = settings.shader_defines();
        defines.extend(self.frame.scene.shader_defines(settings.polygon_sampling));
        ShadingStage::new(
            &self.stage_context()?,
            &ShadingInputs {
                scene: require(&res.geometry, ResourceKind::Scene)?,
                noise: require(&res.noise, ResourceKind::PrecomputedTables)?,
                light_buffers: require(&res.light_buffers, ResourceKind::LightBuffers)?,
                light_textures: require(&res.light_textures, ResourceKind::LightTextures)?,
                defines: &defines,
            },
        )
    }
}

impl ResourceHost for Session {
    fn surface_extent(&self) -> (u32, u32) {
        self.gpu.extent()
    }

    fn request_window_size(&mut self, width: u32, height: u32) {
        tracing::info!(width, height, "requesting window size");
        self.requested_extent = Some((width, height));
        let _ = self.window.request_inner_size(PhysicalSize::new(width, height));
    }

    fn quick_save(&mut self) -> Result<()> {
        let path = &self.frame.active.quicksave;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        quicksave::save(path, &self.frame.scene)?;
        Ok(())
    }

    fn quick_load(&mut self) -> Result<QuickLoadChanges> {
        let loaded = quicksave::load(&self.frame.active.quicksave)?;
        let changes = QuickLoadChanges::between(&self.frame.scene, &loaded);
        self.frame.scene = loaded;
        Ok(changes)
    }

    fn wait_idle(&mut self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.wait_all()?;
        }
        self.gpu
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed to wait for GPU idle: {err}"))?;
        Ok(())
    }

    fn destroy(&mut self, kind: ResourceKind) {
        let res = &mut self.frame.resources;
        match kind {
            ResourceKind::DeviceSurface => {}
            ResourceKind::PrecomputedTables => res.noise = None,
            ResourceKind::Scene => res.geometry = None,
            ResourceKind::RenderTargets => res.targets = None,
            ResourceKind::RenderPass => res.pass_layout = None,
            ResourceKind::ConstantBuffers => res.constants = None,
            ResourceKind::LightBuffers => res.light_buffers = None,
            ResourceKind::LightTextures => res.light_textures = None,
            ResourceKind::GeometryStage => res.geometry_stage = None,
            ResourceKind::ShadingStage => res.shading_stage = None,
            ResourceKind::AccumulateStage => res.accumulate_stage = None,
            ResourceKind::CopyStage => res.copy_stage = None,
            ResourceKind::UiStage => res.ui_stage = None,
            ResourceKind::FrameScheduler => self.scheduler = None,
        }
    }

    fn resize_surface(&mut self) -> Result<SurfaceStatus> {
        let size = match self.requested_extent {
            Some((width, height)) => PhysicalSize::new(width, height),
            None => self.window.inner_size(),
        };
        Ok(self.gpu.resize(size, self.frame.active.settings.v_sync))
    }

    fn create(&mut self, kind: ResourceKind) -> Result<()> {
        let device = &self.gpu.device;
        match kind {
            ResourceKind::DeviceSurface => {}
            ResourceKind::PrecomputedTables => {
                self.frame.resources.noise = Some(NoiseTable::new(device, &self.gpu.queue));
            }
            ResourceKind::Scene => {
                self.frame.resources.geometry = Some(SceneGeometry::load(device, &self.frame.active.scene));
            }
            ResourceKind::RenderTargets => {
                let targets = RenderTargets::new(device, self.gpu.extent(), self.gpu.slot_count())?;
                self.frame.resources.targets = Some(targets);
            }
            ResourceKind::RenderPass => {
                self.frame.resources.pass_layout = Some(RenderPassLayout {
                    surface_format: self.gpu.surface_format,
                });
            }
            ResourceKind::ConstantBuffers => {
                self.frame.resources.constants = Some(ConstantBuffers::new(device, self.gpu.slot_count()));
            }
            ResourceKind::LightBuffers => {
                self.frame.resources.light_buffers = Some(LightBuffers::new(device, &self.frame.scene));
            }
            ResourceKind::LightTextures => {
                let textures = LightTextures::load(device, &self.gpu.queue, &self.frame.scene)?;
                self.frame.resources.light_textures = Some(textures);
            }
            ResourceKind::GeometryStage => {
                let stage = GeometryStage::new(&self.stage_context()?)?;
                self.frame.resources.geometry_stage = Some(stage);
            }
            ResourceKind::ShadingStage => {
                let stage = self.create_shading_stage()?;
                self.frame.resources.shading_stage = Some(stage);
            }
            ResourceKind::AccumulateStage => {
                let stage = AccumulateStage::new(&self.stage_context()?)?;
                self.frame.resources.accumulate_stage = Some(stage);
            }
            ResourceKind::CopyStage => {
                let stage = CopyStage::new(&self.stage_context()?)?;
                self.frame.resources.copy_stage = Some(stage);
            }
            ResourceKind::UiStage => {
                let stage = UiStage::new(&self.stage_context()?)?;
                self.frame.resources.ui_stage = Some(stage);
            }
            ResourceKind::FrameScheduler => {
                self.scheduler = Some(FrameInFlightScheduler::new(&mut self.gpu)?);
                self.frame.last_presented = None;
            }
        }
        Ok(())
    }
}
