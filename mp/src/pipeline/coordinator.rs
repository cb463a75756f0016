//! Lifecycle of background search tasks racing the foreground retry loop

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::abort::AbortSignal;
use super::plugin::{AttemptSnapshot, BackgroundCapability, Plugin, SpawnConfig, TaskMeta};
use super::result::BackgroundTaskResult;

struct RaceState {
    results: Vec<BackgroundTaskResult>,
    first_success: Option<BackgroundTaskResult>,
    next_task: u64,
    foreground_abort: AbortSignal,
}

impl RaceState {
    fn fresh() -> Self {
        Self {
            results: Vec::new(),
            first_success: None,
            next_task: 1,
            foreground_abort: AbortSignal::new(),
        }
    }
}

struct RunningTask {
    task_id: String,
    cancel: AbortSignal,
    handle: JoinHandle<()>,
}

/// Spawns, tracks, and cancels background tasks, and owns the
/// foreground-abort signal that fires when any of them matches.
///
/// The foreground observes background successes only at its own
/// synchronization points (top of each retry iteration, and after
/// `cancel_all`); between those points it runs as though no background
/// activity exists.
pub struct BackgroundTaskCoordinator {
    plugins: Vec<Arc<dyn Plugin>>,
    state: Arc<Mutex<RaceState>>,
    tasks: Mutex<Vec<RunningTask>>,
}

impl BackgroundTaskCoordinator {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            state: Arc::new(Mutex::new(RaceState::fresh())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a background-capable plugin. Plugins without the capability
    /// are ignored with a warning.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        if plugin.background().is_none() {
            warn!(plugin_id = %plugin.id(), "plugin has no background capability, not registering");
            return;
        }
        self.plugins.push(plugin);
    }

    pub fn registered_count(&self) -> usize {
        self.plugins.len()
    }

    /// Current foreground-abort signal. Fired once per prompt run, on the
    /// first background success; replaced by `reset`.
    pub async fn foreground_abort(&self) -> AbortSignal {
        self.state.lock().await.foreground_abort.clone()
    }

    /// First background success observed this prompt run. Later successes
    /// are recorded in the result list but never replace it.
    ///
    /// Yields once before reading so tasks that already settled get to
    /// publish into the mailbox.
    pub async fn success_result(&self) -> Option<BackgroundTaskResult> {
        tokio::task::yield_now().await;
        self.state.lock().await.first_success.clone()
    }

    /// All task results accumulated this prompt run, in completion order
    pub async fn results(&self) -> Vec<BackgroundTaskResult> {
        self.state.lock().await.results.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Offer a finished foreground attempt to every registered plugin and
    /// spawn a task for each one that wants in.
    pub async fn on_attempt_complete(&self, snapshot: &AttemptSnapshot) {
        for plugin in &self.plugins {
            let Some(capability) = plugin.background() else {
                continue;
            };
            let Some(config) = capability.should_spawn(snapshot) else {
                continue;
            };
            self.spawn_task(plugin.id().to_string(), capability, config).await;
        }
    }

    async fn spawn_task(
        &self,
        plugin_id: String,
        capability: Arc<dyn BackgroundCapability>,
        config: SpawnConfig,
    ) {
        let task_id = {
            let mut state = self.state.lock().await;
            let n = state.next_task;
            state.next_task += 1;
            format!("{}-{}", plugin_id, n)
        };

        info!(%task_id, triggered_by = config.triggered_by_attempt, "spawning background task");

        let cancel = AbortSignal::new();
        let task_cancel = cancel.clone();
        let state = self.state.clone();
        let id = task_id.clone();
        let triggered_by_attempt = config.triggered_by_attempt;

        let handle = tokio::spawn(async move {
            let start_timestamp = Utc::now();
            let started = Instant::now();

            let outcome = capability.run(config, task_cancel).await;
            let meta = TaskMeta {
                task_id: id.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                triggered_by_attempt,
                start_timestamp,
            };

            let result = match outcome {
                Ok(data) => capability.to_background_task_result(&plugin_id, data, meta),
                Err(e) => {
                    debug!(task_id = %id, error = %e, "background task errored");
                    BackgroundTaskResult {
                        task_id: meta.task_id,
                        plugin_id,
                        success: false,
                        duration_ms: meta.duration_ms,
                        start_timestamp: meta.start_timestamp,
                        triggered_by_attempt: meta.triggered_by_attempt,
                        data: serde_json::json!({ "error": e.to_string() }),
                    }
                }
            };

            let mut state = state.lock().await;
            let success = result.success;
            state.results.push(result.clone());
            if success && state.first_success.is_none() {
                info!(task_id = %id, "background task matched, aborting foreground");
                state.first_success = Some(result);
                state.foreground_abort.abort();
            }
        });

        self.tasks.lock().await.push(RunningTask {
            task_id,
            cancel,
            handle,
        });
    }

    /// Fire cancellation on every active task and await settlement.
    /// Task errors are swallowed; this never fails.
    pub async fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }

        info!(count = tasks.len(), "cancelling background tasks");
        for task in tasks.iter() {
            task.cancel.abort();
        }

        for task in tasks.drain(..) {
            if let Err(e) = task.handle.await {
                debug!(task_id = %task.task_id, error = %e, "background task join failed");
            }
        }
    }

    /// Prepare for the next prompt run. Cancels nothing (call `cancel_all`
    /// first); clears accumulated results, restarts the task-id counter,
    /// and replaces the foreground-abort signal with a fresh one.
    pub async fn reset(&self) {
        self.tasks.lock().await.clear();
        *self.state.lock().await = RaceState::fresh();
    }
}

impl Default for BackgroundTaskCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::pipeline::context::PipelineContext;
    use crate::pipeline::result::{AttemptResult, PluginResult};
    use async_trait::async_trait;
    use eyre::Result;
    use std::path::PathBuf;
    use std::time::Duration;

    struct StubSearch {
        matched: bool,
        delay_ms: u64,
    }

    #[async_trait]
    impl BackgroundCapability for StubSearch {
        fn should_spawn(&self, snapshot: &AttemptSnapshot) -> Option<SpawnConfig> {
            Some(SpawnConfig {
                function_name: snapshot.context.function_name.clone(),
                source: String::new(),
                context_file_path: None,
                target_object_path: PathBuf::from("target.o"),
                compiler_flags: String::new(),
                triggered_by_attempt: snapshot.attempt_number,
            })
        }

        async fn run(&self, _config: SpawnConfig, cancel: AbortSignal) -> Result<serde_json::Value> {
            if self.delay_ms > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {}
                    _ = cancel.cancelled() => {
                        return Ok(serde_json::json!({ "matched": false, "cancelled": true }));
                    }
                }
            }
            Ok(serde_json::json!({ "matched": self.matched }))
        }

        fn is_success(&self, data: &serde_json::Value) -> bool {
            data["matched"] == true
        }
    }

    struct StubBackgroundPlugin {
        id: String,
        capability: Arc<StubSearch>,
    }

    impl StubBackgroundPlugin {
        fn new(id: &str, matched: bool, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                capability: Arc::new(StubSearch { matched, delay_ms }),
            })
        }
    }

    #[async_trait]
    impl Plugin for StubBackgroundPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            "Stub Background"
        }

        async fn execute(&self, ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
            Ok((PluginResult::success(&self.id, self.name()), ctx))
        }

        fn background(&self) -> Option<Arc<dyn BackgroundCapability>> {
            Some(self.capability.clone())
        }
    }

    fn snapshot(attempt_number: u32) -> AttemptSnapshot {
        let config = std::sync::Arc::new(GlobalConfig::default());
        let prompt = crate::benchmark::PromptRecord {
            path: PathBuf::from("prompts/fn/prompt.md"),
            content: "prompt".to_string(),
            function_name: "fn".to_string(),
            target_object_path: PathBuf::from("target.o"),
            asm: String::new(),
        };
        AttemptSnapshot {
            attempt_number,
            will_retry: true,
            context: PipelineContext::new(&prompt, config),
            attempt: AttemptResult {
                attempt_number,
                plugin_results: vec![],
                success: false,
                duration_ms: 0,
                start_timestamp: Utc::now(),
            },
        }
    }

    async fn settled(coordinator: &BackgroundTaskCoordinator) {
        // Drive every spawned task to completion before asserting.
        coordinator.cancel_all().await;
    }

    #[tokio::test]
    async fn test_register_ignores_plugins_without_capability() {
        struct Plain;

        #[async_trait]
        impl Plugin for Plain {
            fn id(&self) -> &str {
                "plain"
            }
            fn name(&self) -> &str {
                "Plain"
            }
            async fn execute(&self, ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
                Ok((PluginResult::success("plain", "Plain"), ctx))
            }
        }

        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(Arc::new(Plain));
        assert_eq!(coordinator.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_task_id_format_and_counter() {
        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(StubBackgroundPlugin::new("permuter", false, 0));

        coordinator.on_attempt_complete(&snapshot(1)).await;
        coordinator.on_attempt_complete(&snapshot(2)).await;
        settled(&coordinator).await;

        let results = coordinator.results().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].task_id, "permuter-1");
        assert_eq!(results[1].task_id, "permuter-2");
        assert_eq!(results[0].triggered_by_attempt, 1);
        assert_eq!(results[1].triggered_by_attempt, 2);
    }

    #[tokio::test]
    async fn test_first_success_fires_foreground_abort() {
        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(StubBackgroundPlugin::new("permuter", true, 0));

        let signal = coordinator.foreground_abort().await;
        assert!(!signal.is_aborted());

        coordinator.on_attempt_complete(&snapshot(1)).await;
        settled(&coordinator).await;

        assert!(signal.is_aborted());
        let success = coordinator.success_result().await.unwrap();
        assert_eq!(success.plugin_id, "permuter");
        assert!(success.success);
    }

    #[tokio::test]
    async fn test_first_success_is_never_replaced() {
        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(StubBackgroundPlugin::new("fast", true, 0));
        coordinator.register(StubBackgroundPlugin::new("slow", true, 50));

        coordinator.on_attempt_complete(&snapshot(1)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        settled(&coordinator).await;

        let success = coordinator.success_result().await.unwrap();
        assert_eq!(success.plugin_id, "fast");

        // Both are still in the result list.
        assert_eq!(coordinator.results().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_settles_long_tasks() {
        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(StubBackgroundPlugin::new("permuter", true, 60_000));

        coordinator.on_attempt_complete(&snapshot(1)).await;
        assert_eq!(coordinator.active_count().await, 1);

        coordinator.cancel_all().await;
        assert_eq!(coordinator.active_count().await, 0);

        // The cancelled task recorded a non-matching result.
        let results = coordinator.results().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(coordinator.success_result().await.is_none());
    }

    #[tokio::test]
    async fn test_reset_replaces_signal_and_clears_state() {
        let mut coordinator = BackgroundTaskCoordinator::new();
        coordinator.register(StubBackgroundPlugin::new("permuter", true, 0));

        coordinator.on_attempt_complete(&snapshot(1)).await;
        settled(&coordinator).await;

        let old_signal = coordinator.foreground_abort().await;
        assert!(old_signal.is_aborted());

        coordinator.reset().await;

        let new_signal = coordinator.foreground_abort().await;
        assert!(!new_signal.is_aborted());
        assert!(coordinator.success_result().await.is_none());
        assert!(coordinator.results().await.is_empty());

        // Task ids restart at 1.
        coordinator.on_attempt_complete(&snapshot(1)).await;
        settled(&coordinator).await;
        assert_eq!(coordinator.results().await[0].task_id, "permuter-1");
    }
}
