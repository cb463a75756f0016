//! Plugin contract - the polymorphic step abstraction

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;

use super::abort::AbortSignal;
use super::context::PipelineContext;
use super::result::{AttemptResult, AttemptSummary, BackgroundTaskResult, PluginResult, ReportSection};

/// A pipeline step.
///
/// `execute` may fail in two ways: returning a failure result halts the
/// current attempt and skips the remaining plugins; raising an error is
/// converted into a synthetic failure unless it is a [`PipelineAbort`],
/// which propagates to the benchmark driver untouched.
///
/// Plugins must not hold pipeline-global state across prompts unless
/// documented. The agent plugin does (session token and conversation cache).
///
/// [`PipelineAbort`]: super::abort::PipelineAbort
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier used in results and configuration
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Run this step, returning the result and a possibly extended context
    async fn execute(&self, ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)>;

    /// Reshape the context before attempts 2..N of the AI-powered flow
    async fn prepare_retry(
        &self,
        ctx: PipelineContext,
        _previous: &[AttemptSummary],
    ) -> Result<PipelineContext> {
        Ok(ctx)
    }

    /// Install the cancellation source the plugin must honor during long I/O
    fn set_foreground_abort(&self, _signal: AbortSignal) {}

    /// Decorative report fragments. The engine never reads these.
    fn report_sections(&self, _result: &PluginResult, _ctx: &PipelineContext) -> Vec<ReportSection> {
        Vec::new()
    }

    /// Background race participation, if any
    fn background(&self) -> Option<Arc<dyn BackgroundCapability>> {
        None
    }

    /// One-shot hook at benchmark end (cache persistence and the like)
    async fn finalize(&self) -> Result<()> {
        Ok(())
    }
}

/// What the coordinator knows about a finished foreground attempt
#[derive(Debug, Clone)]
pub struct AttemptSnapshot {
    pub attempt_number: u32,
    pub will_retry: bool,
    pub context: PipelineContext,
    pub attempt: AttemptResult,
}

/// Immutable configuration handed to a spawned background task.
///
/// Background tasks never touch the foreground context; everything they
/// need is copied in here at spawn time.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub function_name: String,
    pub source: String,
    pub context_file_path: Option<PathBuf>,
    pub target_object_path: PathBuf,
    pub compiler_flags: String,
    pub triggered_by_attempt: u32,
}

/// Metadata the coordinator attaches when wrapping a task outcome
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub task_id: String,
    pub duration_ms: u64,
    pub triggered_by_attempt: u32,
    pub start_timestamp: DateTime<Utc>,
}

/// Optional capability that lets a plugin race the foreground retry loop
#[async_trait]
pub trait BackgroundCapability: Send + Sync {
    /// Decide whether a failed attempt warrants spawning a search task
    fn should_spawn(&self, snapshot: &AttemptSnapshot) -> Option<SpawnConfig>;

    /// Run the search. Must honor `cancel` and return best-effort on it.
    async fn run(&self, config: SpawnConfig, cancel: AbortSignal) -> Result<serde_json::Value>;

    /// Whether a task outcome counts as a match
    fn is_success(&self, data: &serde_json::Value) -> bool;

    /// Wrap a task outcome with the coordinator-supplied metadata
    fn to_background_task_result(
        &self,
        plugin_id: &str,
        data: serde_json::Value,
        meta: TaskMeta,
    ) -> BackgroundTaskResult {
        BackgroundTaskResult {
            task_id: meta.task_id,
            plugin_id: plugin_id.to_string(),
            success: self.is_success(&data),
            duration_ms: meta.duration_ms,
            start_timestamp: meta.start_timestamp,
            triggered_by_attempt: meta.triggered_by_attempt,
            data,
        }
    }
}
