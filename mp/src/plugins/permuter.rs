//! Background plugin: mutation search racing the retry loop

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

use crate::config::PermuterConfig;
use crate::externals::{MutationSearcher, SearchRequest};
use crate::pipeline::{
    AbortSignal, AttemptSnapshot, BackgroundCapability, PipelineContext, Plugin, PluginResult,
    SpawnConfig,
};

use super::objdiff::OBJDIFF_PLUGIN_ID;

pub const PERMUTER_PLUGIN_ID: &str = "permuter";

/// Spawns a mutation search whenever a failed attempt compiled and scored
/// close enough to the target. Registered with the background coordinator
/// only; it has no foreground role.
pub struct PermuterPlugin {
    capability: Arc<PermuterSearch>,
}

impl PermuterPlugin {
    pub fn new(searcher: Arc<dyn MutationSearcher>, config: &PermuterConfig, scratch_dir: PathBuf) -> Self {
        Self {
            capability: Arc::new(PermuterSearch {
                searcher,
                spawn_threshold: config.spawn_threshold,
                scratch_dir,
            }),
        }
    }
}

#[async_trait]
impl Plugin for PermuterPlugin {
    fn id(&self) -> &str {
        PERMUTER_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Permuter"
    }

    fn description(&self) -> &str {
        "Mutation search over near-miss candidates"
    }

    async fn execute(&self, ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let result = PluginResult::failure(self.id(), self.name(), "Permuter runs only as a background task");
        Ok((result, ctx))
    }

    fn background(&self) -> Option<Arc<dyn BackgroundCapability>> {
        Some(self.capability.clone())
    }
}

struct PermuterSearch {
    searcher: Arc<dyn MutationSearcher>,
    spawn_threshold: u64,
    scratch_dir: PathBuf,
}

#[async_trait]
impl BackgroundCapability for PermuterSearch {
    fn should_spawn(&self, snapshot: &AttemptSnapshot) -> Option<SpawnConfig> {
        let ctx = &snapshot.context;
        let source = ctx.generated_code.clone()?;

        let count = snapshot
            .attempt
            .plugin_results
            .iter()
            .find(|r| r.plugin_id == OBJDIFF_PLUGIN_ID)
            .and_then(|r| r.data.as_ref())
            .and_then(|d| d.get("differenceCount"))
            .and_then(|v| v.as_u64())?;

        if count == 0 || count > self.spawn_threshold {
            debug!(count, threshold = self.spawn_threshold, "attempt outside spawn window");
            return None;
        }

        Some(SpawnConfig {
            function_name: ctx.function_name.clone(),
            source,
            context_file_path: ctx.context_file_path.clone(),
            target_object_path: ctx.target_object_path.clone(),
            compiler_flags: ctx.config.compiler_flags.clone(),
            triggered_by_attempt: snapshot.attempt_number,
        })
    }

    async fn run(&self, config: SpawnConfig, cancel: AbortSignal) -> Result<serde_json::Value> {
        let request = SearchRequest {
            function_name: config.function_name.clone(),
            source: config.source,
            context_file_path: config.context_file_path,
            target_object_path: config.target_object_path,
            compiler_flags: config.compiler_flags,
            scratch_dir: self
                .scratch_dir
                .join(format!("{}-{}", config.function_name, config.triggered_by_attempt)),
        };

        let outcome = self.searcher.search(&request, cancel).await?;
        Ok(serde_json::json!({
            "matched": outcome.matched,
            "score": outcome.score,
            "code": outcome.code,
        }))
    }

    fn is_success(&self, data: &serde_json::Value) -> bool {
        data["matched"] == true
    }
}
