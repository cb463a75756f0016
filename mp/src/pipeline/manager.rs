//! PluginManager - the three-phase orchestration engine
//!
//! Runs one prompt through:
//! 1. the setup flow (once, fatal on failure),
//! 2. the programmatic flow (once, success short-circuits),
//! 3. the AI-powered retry loop, raced against background search tasks.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use eyre::Result;
use tracing::{debug, info, warn};

use crate::benchmark::PromptRecord;
use crate::config::GlobalConfig;

use super::abort::PipelineAbort;
use super::context::PipelineContext;
use super::coordinator::BackgroundTaskCoordinator;
use super::plugin::{AttemptSnapshot, Plugin};
use super::result::{AttemptResult, MatchSource, PipelineRunResult, PluginResult};

/// Registers plugins into three ordered buckets and drives them per prompt
pub struct PluginManager {
    setup_plugins: Vec<Arc<dyn Plugin>>,
    programmatic_plugins: Vec<Arc<dyn Plugin>>,
    main_plugins: Vec<Arc<dyn Plugin>>,
    coordinator: Option<Arc<BackgroundTaskCoordinator>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            setup_plugins: Vec::new(),
            programmatic_plugins: Vec::new(),
            main_plugins: Vec::new(),
            coordinator: None,
        }
    }

    pub fn register_setup(&mut self, plugin: Arc<dyn Plugin>) {
        self.setup_plugins.push(plugin);
    }

    pub fn register_programmatic(&mut self, plugin: Arc<dyn Plugin>) {
        self.programmatic_plugins.push(plugin);
    }

    pub fn register_main(&mut self, plugin: Arc<dyn Plugin>) {
        self.main_plugins.push(plugin);
    }

    pub fn set_coordinator(&mut self, coordinator: Arc<BackgroundTaskCoordinator>) {
        self.coordinator = Some(coordinator);
    }

    /// Every registered plugin exactly once, for benchmark-end hooks.
    /// Scorer plugins registered in more than one bucket (the same `Arc`
    /// in the programmatic and main flows) appear a single time.
    pub fn plugins(&self) -> Vec<&Arc<dyn Plugin>> {
        let mut unique: Vec<&Arc<dyn Plugin>> = Vec::new();
        for plugin in self
            .setup_plugins
            .iter()
            .chain(self.programmatic_plugins.iter())
            .chain(self.main_plugins.iter())
        {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, plugin)) {
                unique.push(plugin);
            }
        }
        unique
    }

    /// Execute `plugins` sequentially, threading the returned context.
    ///
    /// A declared failure or an ordinary raised error halts the attempt and
    /// marks the remaining plugins skipped; [`PipelineAbort`] is re-raised.
    pub async fn run_attempt(
        &self,
        mut ctx: PipelineContext,
        plugins: &[Arc<dyn Plugin>],
    ) -> Result<(AttemptResult, PipelineContext)> {
        let start_timestamp = Utc::now();
        let started = Instant::now();
        let attempt_number = ctx.attempt_number;

        let mut plugin_results: Vec<PluginResult> = Vec::with_capacity(plugins.len());
        let mut failed_index: Option<usize> = None;

        for (index, plugin) in plugins.iter().enumerate() {
            debug!(plugin_id = %plugin.id(), attempt_number, "executing plugin");
            let plugin_started = Instant::now();

            match plugin.execute(ctx.clone()).await {
                Ok((mut result, next_ctx)) => {
                    result.duration_ms = plugin_started.elapsed().as_millis() as u64;
                    ctx = next_ctx;
                    let failed = result.failed();
                    plugin_results.push(result);
                    if failed {
                        failed_index = Some(index);
                        break;
                    }
                }
                Err(report) => {
                    if report.downcast_ref::<PipelineAbort>().is_some() {
                        return Err(report);
                    }
                    warn!(plugin_id = %plugin.id(), error = %report, "plugin raised");
                    let mut result = PluginResult::failure(
                        plugin.id(),
                        plugin.name(),
                        format!("Unexpected error: {report}"),
                    );
                    result.duration_ms = plugin_started.elapsed().as_millis() as u64;
                    plugin_results.push(result);
                    failed_index = Some(index);
                    break;
                }
            }
        }

        if let Some(index) = failed_index {
            for plugin in &plugins[index + 1..] {
                plugin_results.push(PluginResult::skipped(plugin.id(), plugin.name()));
            }
        }

        let attempt = AttemptResult {
            attempt_number,
            plugin_results,
            success: failed_index.is_none(),
            duration_ms: started.elapsed().as_millis() as u64,
            start_timestamp,
        };

        Ok((attempt, ctx))
    }

    /// Run one prompt through all three phases
    pub async fn run_pipeline(
        &self,
        prompt: &PromptRecord,
        config: Arc<GlobalConfig>,
    ) -> Result<PipelineRunResult> {
        let started = Instant::now();
        info!(function = %prompt.function_name, "pipeline run starting");

        let mut ctx = PipelineContext::new(prompt, config);

        // Phase A: setup flow, fatal on failure
        let (setup_flow, next_ctx) = self.run_attempt(ctx, &self.setup_plugins).await?;
        ctx = next_ctx;

        if !setup_flow.success {
            warn!(function = %prompt.function_name, "setup flow failed");
            return Ok(PipelineRunResult {
                prompt_path: prompt.path.clone(),
                function_name: prompt.function_name.clone(),
                success: false,
                attempts: Vec::new(),
                total_duration_ms: started.elapsed().as_millis() as u64,
                setup_flow,
                programmatic_flow: None,
                background_tasks: None,
                match_source: None,
            });
        }

        // Phase B: one-shot programmatic flow, success short-circuits
        let mut programmatic_flow = None;
        if !self.programmatic_plugins.is_empty() {
            let (attempt, next_ctx) = self.run_attempt(ctx, &self.programmatic_plugins).await?;
            ctx = next_ctx;

            if attempt.success {
                info!(function = %prompt.function_name, "programmatic flow matched");
                return Ok(PipelineRunResult {
                    prompt_path: prompt.path.clone(),
                    function_name: prompt.function_name.clone(),
                    success: true,
                    attempts: Vec::new(),
                    total_duration_ms: started.elapsed().as_millis() as u64,
                    setup_flow,
                    programmatic_flow: Some(attempt),
                    background_tasks: None,
                    match_source: Some(MatchSource::ProgrammaticFlow),
                });
            }

            // Hand the near miss to the AI-powered flow.
            let mut m2c = ctx.m2c_context.take().unwrap_or_default();
            if let Some(result) = attempt
                .plugin_results
                .iter()
                .find(|r| r.plugin_id == "compiler" && r.failed())
            {
                m2c.compilation_error = result.output.clone().or_else(|| result.error.clone());
            } else if let Some(result) = attempt.plugin_results.iter().find(|r| r.plugin_id == "objdiff") {
                m2c.objdiff_output = result.output.clone().or_else(|| result.error.clone());
            }
            ctx.m2c_context = Some(m2c);
            ctx.generated_code = None;

            programmatic_flow = Some(attempt);
        }

        // Phase C: retry loop raced against background tasks
        if let Some(coordinator) = &self.coordinator {
            coordinator.reset().await;
            let signal = coordinator.foreground_abort().await;
            for plugin in &self.main_plugins {
                plugin.set_foreground_abort(signal.clone());
            }
        }

        let mut attempts: Vec<AttemptResult> = Vec::new();
        let mut success = false;
        let mut match_source: Option<MatchSource> = None;

        let max_retries = ctx.max_retries;
        for attempt_number in 1..=max_retries {
            if let Some(coordinator) = &self.coordinator {
                if let Some(background) = coordinator.success_result().await {
                    info!(task_id = %background.task_id, "background match observed, stopping retries");
                    success = true;
                    match_source = Some(MatchSource::Background(background.plugin_id));
                    break;
                }
            }

            ctx.attempt_number = attempt_number;
            let (attempt, next_ctx) = self.run_attempt(ctx, &self.main_plugins).await?;
            ctx = next_ctx;

            let will_retry = !attempt.success && attempt_number < max_retries;
            let summary = attempt.summarize();
            attempts.push(attempt.clone());

            if attempt.success {
                info!(function = %prompt.function_name, attempt_number, "attempt matched");
                success = true;
                match_source = Some(MatchSource::Claude);
                break;
            }

            if let Some(coordinator) = &self.coordinator {
                coordinator
                    .on_attempt_complete(&AttemptSnapshot {
                        attempt_number,
                        will_retry,
                        context: ctx.clone(),
                        attempt,
                    })
                    .await;
            }

            if will_retry {
                ctx.previous_attempts.push(summary);
                let previous = ctx.previous_attempts.clone();
                for plugin in &self.main_plugins {
                    ctx = plugin.prepare_retry(ctx, &previous).await?;
                }
            }
        }

        let mut background_tasks = None;
        if let Some(coordinator) = &self.coordinator {
            coordinator.cancel_all().await;

            // A task may have settled during cancellation.
            if !success {
                if let Some(background) = coordinator.success_result().await {
                    info!(task_id = %background.task_id, "background match observed after cancellation");
                    success = true;
                    match_source = Some(MatchSource::Background(background.plugin_id));
                }
            }

            let results = coordinator.results().await;
            if !results.is_empty() {
                background_tasks = Some(results);
            }
        }

        Ok(PipelineRunResult {
            prompt_path: prompt.path.clone(),
            function_name: prompt.function_name.clone(),
            success,
            attempts,
            total_duration_ms: started.elapsed().as_millis() as u64,
            setup_flow,
            programmatic_flow,
            background_tasks,
            match_source,
        })
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
