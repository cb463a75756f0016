//! Programmatic-flow plugin: algorithmic decompilation

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::info;

use crate::externals::{DecompileRequest, Decompiler};
use crate::pipeline::{M2cContext, PipelineContext, Plugin, PluginResult};

pub const M2C_PLUGIN_ID: &str = "m2c";

/// One-shot algorithmic pass. Its candidate and whatever the scorers say
/// about it are carried into the AI-powered flow as a starting point.
pub struct M2cPlugin {
    decompiler: Arc<dyn Decompiler>,
}

impl M2cPlugin {
    pub fn new(decompiler: Arc<dyn Decompiler>) -> Self {
        Self { decompiler }
    }
}

#[async_trait]
impl Plugin for M2cPlugin {
    fn id(&self) -> &str {
        M2C_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "M2C Decompiler"
    }

    fn description(&self) -> &str {
        "Algorithmic decompilation of the target assembly"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let request = DecompileRequest {
            function_name: ctx.function_name.clone(),
            asm: ctx.asm.clone(),
            context_file_path: ctx.context_file_path.clone(),
            scratch_dir: ctx.config.output_dir.join("m2c"),
        };

        match self.decompiler.decompile(&request).await {
            Ok(code) => {
                info!(function = %ctx.function_name, bytes = code.len(), "decompiler produced a candidate");
                ctx.generated_code = Some(code.clone());
                ctx.m2c_context = Some(M2cContext {
                    generated_code: code.clone(),
                    compilation_error: None,
                    objdiff_output: None,
                });

                let result = PluginResult::success(self.id(), self.name()).with_output(code);
                Ok((result, ctx))
            }
            Err(e) => {
                let result = PluginResult::failure(self.id(), self.name(), e.to_string());
                Ok((result, ctx))
            }
        }
    }
}
