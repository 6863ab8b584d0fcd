use std::path::PathBuf;
use std::time::Duration;

use benchconfig::{Experiment, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use orchestrator::ActiveConfiguration;

/// Shaders bundled with the crate.
pub fn default_shader_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))
}

/// Everything the window needs to start rendering.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub window_size: (u32, u32),
    /// Directory holding the GLSL stages and their includes.
    pub shader_dir: PathBuf,
    /// Experiments the automation engine may run.
    pub experiments: Vec<Experiment>,
    /// Scene, quicksave and settings rendered until an experiment starts.
    pub initial: ActiveConfiguration,
    /// Run every experiment from the first frame and exit afterwards.
    pub run_experiments: bool,
    pub report_interval: Duration,
}

impl RendererConfig {
    pub fn new(initial: ActiveConfiguration) -> Self {
        Self {
            window_size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            shader_dir: default_shader_dir(),
            experiments: Vec::new(),
            initial,
            run_experiments: false,
            report_interval: Duration::from_secs(1),
        }
    }
}

/// What a finished session did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_rendered: u64,
    /// True when every queued experiment ran to completion.
    pub experiments_completed: bool,
}
