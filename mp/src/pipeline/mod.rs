//! Pipeline orchestration engine
//!
//! A prompt runs through three phases: a fatal-on-failure setup flow, a
//! one-shot programmatic flow that short-circuits on success, and a bounded
//! retry loop of main plugins raced against background search tasks.

pub mod abort;
pub mod context;
pub mod coordinator;
pub mod manager;
pub mod plugin;
pub mod result;

pub use abort::{AbortSignal, PipelineAbort};
pub use context::{M2cContext, PipelineContext};
pub use coordinator::BackgroundTaskCoordinator;
pub use manager::PluginManager;
pub use plugin::{AttemptSnapshot, BackgroundCapability, Plugin, SpawnConfig, TaskMeta};
pub use result::{
    AttemptResult, AttemptSummary, BackgroundTaskResult, MatchSource, PipelineRunResult,
    PluginResult, PluginStatus, ReportSection,
};
