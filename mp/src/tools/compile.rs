//! test_compile tool - lets the model check a candidate mid-conversation

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::externals::{CompileRequest, Compiler, DiffScorer};

use super::{Tool, ToolContext, ToolResult};

/// Compiles a candidate and diffs it against the target object
pub struct TestCompileTool {
    compiler: Arc<dyn Compiler>,
    scorer: Arc<dyn DiffScorer>,
}

impl TestCompileTool {
    pub fn new(compiler: Arc<dyn Compiler>, scorer: Arc<dyn DiffScorer>) -> Self {
        Self { compiler, scorer }
    }
}

#[async_trait]
impl Tool for TestCompileTool {
    fn name(&self) -> &'static str {
        "test_compile"
    }

    fn description(&self) -> &'static str {
        "Compile candidate C source and diff the result against the target object. \
         Returns compiler diagnostics on failure, or the remaining difference count."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Complete C source of the candidate function"
                }
            },
            "required": ["source"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(source) = input["source"].as_str() else {
            return ToolResult::error("source is required");
        };

        let request = CompileRequest {
            function_name: ctx.function_name.clone(),
            source: source.to_string(),
            context_file_path: ctx.context_file_path.clone(),
            flags: ctx.compiler_flags.clone(),
            out_dir: ctx.scratch_dir.join("tool"),
        };

        let output = match self.compiler.compile(&request).await {
            Ok(output) => output,
            Err(e) => return ToolResult::error(format!("Compiler unavailable: {e}")),
        };

        if !output.success {
            return ToolResult::error(format!("Compilation failed:\n{}", output.errors.join("\n")));
        }

        let Some(object_path) = output.object_path else {
            return ToolResult::error("Compiler reported success but produced no object");
        };

        let diff = async {
            let target = self.scorer.parse_object(&ctx.target_object_path, "target").await?;
            let current = self.scorer.parse_object(&object_path, "current").await?;
            self.scorer.run_diff(&target, &current, &ctx.function_name).await
        }
        .await;

        match diff {
            Ok(report) => {
                debug!(differences = report.difference_count, "test_compile scored candidate");
                let mut content = format!(
                    "Compiled cleanly. {} difference(s) against the target.",
                    report.difference_count
                );
                if report.difference_count > 0
                    && let Some(right) = report.right
                {
                    content.push_str("\nCurrent assembly:\n");
                    content.push_str(&right);
                }
                ToolResult::success(content)
            }
            Err(e) => ToolResult::error(format!("Diff failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::externals::compiler::mock::MockCompiler;
    use crate::externals::objdiff::mock::MockDiffScorer;
    use std::path::PathBuf;

    fn ctx() -> ToolContext {
        ToolContext {
            function_name: "walk".to_string(),
            target_object_path: PathBuf::from("target.o"),
            context_file_path: None,
            compiler_flags: String::new(),
            scratch_dir: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn test_reports_difference_count() {
        let tool = TestCompileTool::new(
            Arc::new(MockCompiler::succeeding("walk.o")),
            Arc::new(MockDiffScorer::with_counts(vec![3])),
        );

        let result = tool
            .execute(serde_json::json!({ "source": "int walk(void);" }), &ctx())
            .await;

        assert!(!result.is_error);
        assert!(result.content.contains("3 difference(s)"));
        assert!(result.content.contains("current asm"));
    }

    #[tokio::test]
    async fn test_compile_errors_surface() {
        let tool = TestCompileTool::new(
            Arc::new(MockCompiler::failing(vec!["walk.c:3: error: expected ';'"])),
            Arc::new(MockDiffScorer::with_counts(vec![0])),
        );

        let result = tool
            .execute(serde_json::json!({ "source": "int walk(void)" }), &ctx())
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("expected ';'"));
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let tool = TestCompileTool::new(
            Arc::new(MockCompiler::succeeding("walk.o")),
            Arc::new(MockDiffScorer::with_counts(vec![0])),
        );

        let result = tool.execute(serde_json::json!({}), &ctx()).await;
        assert!(result.is_error);
    }
}
