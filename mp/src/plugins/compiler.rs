//! Scorer plugin: compile the current candidate

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

use crate::externals::{CompileRequest, Compiler};
use crate::pipeline::{PipelineContext, Plugin, PluginResult};

pub const COMPILER_PLUGIN_ID: &str = "compiler";

/// Compiles `generated_code` with the configured flags and the materialized
/// context. Used by both the programmatic and the AI-powered flow.
pub struct CompilerPlugin {
    compiler: Arc<dyn Compiler>,
}

impl CompilerPlugin {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl Plugin for CompilerPlugin {
    fn id(&self) -> &str {
        COMPILER_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Compiler"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let Some(source) = ctx.generated_code.clone() else {
            let result = PluginResult::failure(self.id(), self.name(), "No generated code to compile");
            return Ok((result, ctx));
        };

        let request = CompileRequest {
            function_name: ctx.function_name.clone(),
            source,
            context_file_path: ctx.context_file_path.clone(),
            flags: ctx.config.compiler_flags.clone(),
            out_dir: ctx.config.output_dir.join("obj"),
        };

        let output = self.compiler.compile(&request).await?;

        if !output.success {
            debug!(function = %ctx.function_name, "candidate failed to compile");
            let result = PluginResult::failure(self.id(), self.name(), "Compilation failed")
                .with_output(output.errors.join("\n"));
            return Ok((result, ctx));
        }

        ctx.candidate_object_path = output.object_path.clone();
        let result = PluginResult::success(self.id(), self.name()).with_data(serde_json::json!({
            "objectPath": output.object_path.map(|p| p.display().to_string()),
        }));
        Ok((result, ctx))
    }
}
