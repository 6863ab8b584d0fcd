//! wgpu/winit renderer for the polygonal light benchmark.
//!
//! The crate implements every collaborator the orchestrator core talks to
//! and wires them into a window loop:
//!
//! ```text
//!   polybench CLI
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ App ──▶ winit event loop ──▶ App::frame()
//!                                                    │
//!     hotkeys ─▶ UpdateRequest ◀── ExperimentEngine ─┤
//!                      │                             │
//!                      ▼                             ▼
//!        ResourceDependencyGraph::apply ──▶ FrameInFlightScheduler
//!                      │ (Session)                   │ (FrameState)
//!                      ▼                             ▼
//!         rebuild GPU resources        visibility ▸ shading ▸ accumulate ▸ copy ▸ ui
//! ```
//!
//! `Session` owns the device, the surface and every rebuildable resource
//! and implements `ResourceHost`. `FrameState` records one frame per call
//! and implements `FramePipeline`. Shaders are GLSL compiled through naga.

mod compile;
mod config;
mod context;
mod frame;
mod hud;
mod input;
mod lights;
mod scene;
mod session;
mod stages;
mod tables;
mod targets;
mod timing;
mod uniforms;
mod window;

use anyhow::Result;

pub use config::{default_shader_dir, RendererConfig, RunSummary};

/// Entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the benchmark window and blocks until the session ends.
    ///
    /// Errors cover device bring-up, the startup rebuild and any later
    /// rebuild failure; each ends the session.
    pub fn run(&mut self) -> Result<RunSummary> {
        tracing::info!(
            scene = %self.config.initial.scene.name,
            experiments = self.config.experiments.len(),
            run_all = self.config.run_experiments,
            "starting renderer"
        );
        let summary = window::run_window(self.config.clone())?;
        tracing::info!(frames = summary.frames_rendered, "renderer finished");
        Ok(summary)
    }
}
