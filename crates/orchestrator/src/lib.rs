//! Frame orchestration for the polygonal-light benchmark renderer.
//!
//! Everything here is independent of the graphics backend. The renderer
//! implements [`ResourceHost`], [`PresentationDevice`], [`FramePipeline`] and
//! [`ImageSource`]; this crate decides what gets rebuilt, when a frame's
//! resources may be reused, how samples accumulate, how screenshots are
//! captured and how experiment sweeps progress.

pub mod accumulation;
pub mod experiments;
pub mod frame_timer;
pub mod graph;
pub mod quicksave;
pub mod request;
pub mod scene;
pub mod scheduler;
pub mod screenshot;

pub use accumulation::{AccumulationState, CaptureByte, FramePlan, SlotTargets, Stage, TargetRole};
pub use experiments::{ActiveConfiguration, ExperimentEngine, FrameObservation, Step};
pub use frame_timer::{FrameTimeEstimator, FrameTimeReport, TimingsLog};
pub use graph::{
    ApplyOutcome, DependencyGraph, GraphError, RebuildError, ResourceDependencyGraph, ResourceFlags,
    ResourceHost, ResourceKind, SurfaceStatus,
};
pub use quicksave::{QuickLoadChanges, QuicksaveError};
pub use request::UpdateRequest;
pub use scene::{Camera, PolygonalLight, SceneState, Texturing};
pub use scheduler::{
    CompletionSignal, DeviceError, FrameInFlightScheduler, FrameOutcome, FramePipeline,
    PresentationDevice, SchedulerError, WaitStatus,
};
pub use screenshot::{
    CaptureError, CaptureProgress, CaptureRejected, ImageSource, ScreenshotCapture, SourceFormat,
    StagingImage,
};
