//! Setup-flow plugin: materialize the shared C context

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, info};

use crate::pipeline::{PipelineContext, Plugin, PluginResult};

pub const CONTEXT_PLUGIN_ID: &str = "context";

/// Reads the configured context file and materializes it into the output
/// directory so every downstream tool sees the same copy. Failure here is
/// fatal for the prompt run.
pub struct ContextSetupPlugin;

#[async_trait]
impl Plugin for ContextSetupPlugin {
    fn id(&self) -> &str {
        CONTEXT_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Context Setup"
    }

    fn description(&self) -> &str {
        "Materializes the shared C context for the compiler and decompiler"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let Some(source) = ctx.config.context_path.clone() else {
            debug!("no context path configured");
            let result = PluginResult::success(self.id(), self.name()).with_output("No context configured");
            return Ok((result, ctx));
        };

        let content = match tokio::fs::read_to_string(&source).await {
            Ok(content) => content,
            Err(e) => {
                let result = PluginResult::failure(
                    self.id(),
                    self.name(),
                    format!("Failed to read context {}: {e}", source.display()),
                );
                return Ok((result, ctx));
            }
        };

        let out_dir = ctx.config.output_dir.join("ctx");
        if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
            let result = PluginResult::failure(
                self.id(),
                self.name(),
                format!("Failed to create {}: {e}", out_dir.display()),
            );
            return Ok((result, ctx));
        }

        let materialized = out_dir.join("ctx.h");
        if let Err(e) = tokio::fs::write(&materialized, &content).await {
            let result = PluginResult::failure(
                self.id(),
                self.name(),
                format!("Failed to write {}: {e}", materialized.display()),
            );
            return Ok((result, ctx));
        }

        info!(path = %materialized.display(), bytes = content.len(), "context materialized");
        ctx.context_content = Some(content);
        ctx.context_file_path = Some(materialized.clone());

        let result = PluginResult::success(self.id(), self.name())
            .with_output(format!("Context materialized at {}", materialized.display()));
        Ok((result, ctx))
    }
}
