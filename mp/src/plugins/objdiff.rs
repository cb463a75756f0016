//! Scorer plugin: diff the compiled candidate against the target

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, info};

use crate::externals::DiffScorer;
use crate::pipeline::{PipelineContext, Plugin, PluginResult};

pub const OBJDIFF_PLUGIN_ID: &str = "objdiff";

/// Diffs the target function symbol between the target object and the
/// freshly compiled candidate. Zero differences is a match.
pub struct ObjdiffPlugin {
    scorer: Arc<dyn DiffScorer>,
}

impl ObjdiffPlugin {
    pub fn new(scorer: Arc<dyn DiffScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Plugin for ObjdiffPlugin {
    fn id(&self) -> &str {
        OBJDIFF_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Object Diff"
    }

    async fn execute(&self, ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let Some(current_path) = ctx.candidate_object_path.clone() else {
            let result = PluginResult::failure(self.id(), self.name(), "No compiled object to diff");
            return Ok((result, ctx));
        };

        let target = self.scorer.parse_object(&ctx.target_object_path, "target").await?;
        let current = self.scorer.parse_object(&current_path, "current").await?;

        let Some(symbol) = self.scorer.find_symbol(&target, &ctx.function_name).await? else {
            let result = PluginResult::failure(
                self.id(),
                self.name(),
                format!("Symbol {} not found in target object", ctx.function_name),
            );
            return Ok((result, ctx));
        };

        let report = self.scorer.run_diff(&target, &current, &symbol).await?;
        debug!(function = %ctx.function_name, differences = report.difference_count, "diff scored");

        let data = serde_json::json!({ "differenceCount": report.difference_count });

        if report.difference_count == 0 {
            info!(function = %ctx.function_name, "assembly matches target");
            let result = PluginResult::success(self.id(), self.name())
                .with_output("Assembly matches target (0 differences)")
                .with_data(data);
            return Ok((result, ctx));
        }

        let diff_text = match report.right.clone() {
            Some(text) => text,
            None => self.scorer.assembly_for_symbol(&current, &symbol).await?,
        };

        let result = PluginResult::failure(self.id(), self.name(), "Assembly does not match target")
            .with_output(format!(
                "{} difference(s) against the target.\n{}",
                report.difference_count, diff_text
            ))
            .with_data(data);
        Ok((result, ctx))
    }
}
