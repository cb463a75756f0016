//! Benchmark driver - feeds prompts one-by-one to the pipeline
//!
//! A user abort ([`PipelineAbort`]) stops iteration and keeps the results
//! collected so far; any other error escaping a prompt run is recorded as a
//! synthesized setup failure and iteration continues.

pub mod prompts;
pub mod report;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline::{
    AbortSignal, AttemptResult, PipelineAbort, PipelineRunResult, PluginManager, PluginResult,
};

pub use prompts::{PromptRecord, discover_prompts, load_prompt};
pub use report::BenchmarkReport;

/// Aggregate statistics over the prompts that were actually run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub total_prompts: usize,
    pub successful_prompts: usize,
    /// Percentage, 0 when nothing ran
    pub success_rate: f64,
    pub avg_attempts: f64,
    pub total_duration_ms: u64,
}

impl BenchmarkSummary {
    pub fn compute(results: &[PipelineRunResult], total_duration_ms: u64) -> Self {
        let total_prompts = results.len();
        let successful_prompts = results.iter().filter(|r| r.success).count();
        let (success_rate, avg_attempts) = if total_prompts == 0 {
            (0.0, 0.0)
        } else {
            (
                successful_prompts as f64 / total_prompts as f64 * 100.0,
                results.iter().map(|r| r.attempts.len()).sum::<usize>() as f64 / total_prompts as f64,
            )
        };

        Self {
            total_prompts,
            successful_prompts,
            success_rate,
            avg_attempts,
            total_duration_ms,
        }
    }
}

/// Outcome of a whole benchmark run
#[derive(Debug)]
pub struct BenchmarkRun {
    pub results: Vec<PipelineRunResult>,
    pub summary: BenchmarkSummary,
    pub aborted: bool,
}

/// Runs every prompt through the pipeline and aggregates the results
pub struct BenchmarkRunner {
    manager: PluginManager,
    config: Arc<Config>,
    user_abort: AbortSignal,
}

impl BenchmarkRunner {
    pub fn new(manager: PluginManager, config: Arc<Config>) -> Self {
        Self {
            manager,
            config,
            user_abort: AbortSignal::new(),
        }
    }

    /// Signal that stops iteration at the next prompt boundary. Wired to
    /// ctrl-c by the CLI.
    pub fn user_abort(&self) -> AbortSignal {
        self.user_abort.clone()
    }

    pub async fn run(&self, prompts: &[PromptRecord]) -> BenchmarkRun {
        let started = Instant::now();
        let global = Arc::new(self.config.global.clone());

        info!(prompt_count = prompts.len(), "benchmark starting");

        let mut results: Vec<PipelineRunResult> = Vec::new();
        let mut aborted = false;

        for prompt in prompts {
            if self.user_abort.is_aborted() {
                warn!("user abort requested, stopping with partial results");
                aborted = true;
                break;
            }

            match self.manager.run_pipeline(prompt, global.clone()).await {
                Ok(result) => {
                    info!(
                        function = %prompt.function_name,
                        success = result.success,
                        attempts = result.attempts.len(),
                        "prompt finished"
                    );
                    results.push(result);
                }
                Err(report) => {
                    if let Some(abort) = report.downcast_ref::<PipelineAbort>() {
                        warn!(reason = %abort.reason, "benchmark aborted, keeping partial results");
                        aborted = true;
                        break;
                    }

                    error!(
                        function = %prompt.function_name,
                        error = %report,
                        "prompt errored, recording synthetic failure"
                    );
                    results.push(synthesized_failure(prompt, &report));
                }
            }
        }

        let summary = BenchmarkSummary::compute(&results, started.elapsed().as_millis() as u64);
        info!(
            total = summary.total_prompts,
            successful = summary.successful_prompts,
            "benchmark finished"
        );

        // One-shot plugin hooks (cache persistence and the like).
        for plugin in self.manager.plugins() {
            if let Err(e) = plugin.finalize().await {
                warn!(plugin_id = %plugin.id(), error = %e, "plugin finalize failed");
            }
        }

        BenchmarkRun {
            results,
            summary,
            aborted,
        }
    }
}

/// Encode an unexpected error escaping `run_pipeline` as a failed run with
/// a single synthetic plugin failure in the setup-flow slot.
fn synthesized_failure(prompt: &PromptRecord, report: &eyre::Report) -> PipelineRunResult {
    PipelineRunResult {
        prompt_path: prompt.path.clone(),
        function_name: prompt.function_name.clone(),
        success: false,
        attempts: Vec::new(),
        total_duration_ms: 0,
        setup_flow: AttemptResult {
            attempt_number: 0,
            plugin_results: vec![PluginResult::failure(
                "pipeline",
                "Pipeline",
                format!("Unexpected error: {report}"),
            )],
            success: false,
            duration_ms: 0,
            start_timestamp: Utc::now(),
        },
        programmatic_flow: None,
        background_tasks: None,
        match_source: None,
    }
}
