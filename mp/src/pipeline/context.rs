//! Shared context threaded through every plugin call

use std::path::PathBuf;
use std::sync::Arc;

use crate::benchmark::PromptRecord;
use crate::config::GlobalConfig;
use crate::pipeline::result::AttemptSummary;

/// Hand-off from the programmatic flow to the AI-powered flow.
///
/// Carries the algorithmic decompiler's candidate and whatever the scorers
/// said about it, so the agent can start from a near miss instead of from
/// scratch.
#[derive(Debug, Clone, Default)]
pub struct M2cContext {
    pub generated_code: String,
    pub compilation_error: Option<String>,
    pub objdiff_output: Option<String>,
}

/// Mutable per-attempt carrier owned by the pipeline run.
///
/// Plugins receive a clone and return a possibly extended copy; the engine
/// threads the returned context into the next plugin. One attempt never
/// observes another attempt's unpublished mutations.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    // Immutable inputs for the run
    pub prompt_path: PathBuf,
    pub prompt_content: String,
    pub function_name: String,
    pub target_object_path: PathBuf,
    pub asm: String,

    /// Current attempt index, 1-based. 0 outside the retry loop.
    pub attempt_number: u32,
    pub max_retries: u32,

    /// Summaries of prior attempts, oldest first. Skipped plugins excluded.
    pub previous_attempts: Vec<AttemptSummary>,

    /// Immutable run configuration
    pub config: Arc<GlobalConfig>,

    // Setup-flow outputs
    pub context_content: Option<String>,
    pub context_file_path: Option<PathBuf>,

    /// Current candidate C source
    pub generated_code: Option<String>,

    /// Object file produced from the current candidate, if it compiled
    pub candidate_object_path: Option<PathBuf>,

    /// Programmatic-flow hand-off
    pub m2c_context: Option<M2cContext>,
}

impl PipelineContext {
    pub fn new(prompt: &PromptRecord, config: Arc<GlobalConfig>) -> Self {
        Self {
            prompt_path: prompt.path.clone(),
            prompt_content: prompt.content.clone(),
            function_name: prompt.function_name.clone(),
            target_object_path: prompt.target_object_path.clone(),
            asm: prompt.asm.clone(),
            attempt_number: 0,
            max_retries: config.max_retries,
            previous_attempts: Vec::new(),
            config,
            context_content: None,
            context_file_path: None,
            generated_code: None,
            candidate_object_path: None,
            m2c_context: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PromptRecord {
        PromptRecord {
            path: PathBuf::from("prompts/walk/prompt.md"),
            content: "Decompile walk".to_string(),
            function_name: "walk".to_string(),
            target_object_path: PathBuf::from("prompts/walk/target.o"),
            asm: "lwz r3, 0(r3)".to_string(),
        }
    }

    #[test]
    fn test_new_context_from_prompt() {
        let config = Arc::new(GlobalConfig::default());
        let ctx = PipelineContext::new(&prompt(), config.clone());

        assert_eq!(ctx.function_name, "walk");
        assert_eq!(ctx.attempt_number, 0);
        assert_eq!(ctx.max_retries, config.max_retries);
        assert!(ctx.previous_attempts.is_empty());
        assert!(ctx.generated_code.is_none());
        assert!(ctx.m2c_context.is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let config = Arc::new(GlobalConfig::default());
        let ctx = PipelineContext::new(&prompt(), config);

        let mut other = ctx.clone();
        other.generated_code = Some("int walk(void);".to_string());
        other.attempt_number = 3;

        assert!(ctx.generated_code.is_none());
        assert_eq!(ctx.attempt_number, 0);
    }
}
