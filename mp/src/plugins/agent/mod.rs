//! The agentic main plugin
//!
//! Holds state across prompts by design: one live transport session per
//! pipeline run (resumed between retries), and a conversation-tree cache
//! that replays known exchanges without calling the transport.

pub mod cache;
pub mod feedback;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use eyre::Result;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::agent::{AgentReply, AgentRequest, AgentTransport, QueryEnv};
use crate::config::AgentConfig;
use crate::externals::{UsageLimitDecision, UserPrompter};
use crate::pipeline::{
    AbortSignal, AttemptSummary, PipelineAbort, PipelineContext, Plugin, PluginResult,
};
use crate::tools::{ToolContext, ToolExecutor};

use cache::{CacheNode, ConversationCache};
use feedback::StallTracker;

pub const AGENT_PLUGIN_ID: &str = "claude";

/// Error token a foreground abort leaves in the attempt record
pub const BACKGROUND_MATCH_ERROR: &str = "background plugin found a perfect match";

const FALLBACK_FOLLOWUP: &str = "The previous attempt failed. Try again with a different approach.";

#[derive(Default)]
struct AgentState {
    session_token: Option<String>,
    followup: Option<String>,
    stall: StallTracker,
    cursor: Vec<String>,
}

enum QueryOutcome {
    Reply(AgentReply),
    Aborted,
    Failed(String),
}

pub struct AgentPlugin {
    transport: Arc<dyn AgentTransport>,
    tools: ToolExecutor,
    prompter: Option<Arc<dyn UserPrompter>>,
    config: AgentConfig,
    cache_path: Option<PathBuf>,
    abort: StdMutex<Option<AbortSignal>>,
    state: Mutex<AgentState>,
    cache: Mutex<ConversationCache>,
}

impl AgentPlugin {
    pub fn new(transport: Arc<dyn AgentTransport>, tools: ToolExecutor, config: AgentConfig) -> Self {
        Self {
            transport,
            tools,
            prompter: None,
            config,
            cache_path: None,
            abort: StdMutex::new(None),
            state: Mutex::new(AgentState::default()),
            cache: Mutex::new(ConversationCache::default()),
        }
    }

    /// Install the collaborator asked about usage-limit pauses. Without
    /// one, usage-limit errors surface as ordinary failures.
    pub fn with_prompter(mut self, prompter: Arc<dyn UserPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Load the conversation cache from `path` and persist it there at
    /// benchmark end.
    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache = Mutex::new(ConversationCache::load(&path));
        self.cache_path = Some(path);
        self
    }

    fn abort_signal(&self) -> Option<AbortSignal> {
        match self.abort.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn background_match_failure(&self) -> PluginResult {
        PluginResult::failure(self.id(), self.name(), BACKGROUND_MATCH_ERROR)
    }

    async fn query_with_deflection(
        &self,
        request: AgentRequest,
        tool_ctx: &ToolContext,
        abort: Option<&AbortSignal>,
    ) -> Result<QueryOutcome> {
        loop {
            let (events_tx, mut events_rx) = mpsc::channel(64);
            let drain = tokio::spawn(async move {
                while let Some(message) = events_rx.recv().await {
                    tracing::trace!(?message, "transport message");
                }
            });

            let env = QueryEnv {
                tools: &self.tools,
                tool_ctx,
                events: events_tx,
            };
            let query = self.transport.query(request.clone(), env);

            let outcome = match abort {
                Some(signal) => {
                    tokio::select! {
                        result = query => Some(result),
                        _ = signal.cancelled() => None,
                    }
                }
                None => Some(query.await),
            };
            drop(drain);

            match outcome {
                None => return Ok(QueryOutcome::Aborted),
                Some(Ok(reply)) => return Ok(QueryOutcome::Reply(reply)),
                Some(Err(e)) if e.is_usage_limit() => {
                    warn!(error = %e, "transport reported a usage limit");
                    match &self.prompter {
                        Some(prompter) => match prompter.ask_usage_limit(&e.to_string()).await? {
                            UsageLimitDecision::Continue => continue,
                            UsageLimitDecision::Abort => {
                                return Err(PipelineAbort::new(format!("usage limit: {e}")).into());
                            }
                        },
                        None => return Ok(QueryOutcome::Failed(e.to_string())),
                    }
                }
                Some(Err(e)) => return Ok(QueryOutcome::Failed(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl Plugin for AgentPlugin {
    fn id(&self) -> &str {
        AGENT_PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Claude Agent"
    }

    fn description(&self) -> &str {
        "Agentic code generation with per-run session continuity"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<(PluginResult, PipelineContext)> {
        let abort = self.abort_signal();
        if let Some(signal) = &abort
            && signal.is_aborted()
        {
            return Ok((self.background_match_failure(), ctx));
        }

        let first_attempt = ctx.attempt_number <= 1;

        let (prompt, resume, cursor) = {
            let mut state = self.state.lock().await;
            if first_attempt {
                // One live session per pipeline run.
                state.session_token = None;
                state.cursor.clear();
            }
            let prompt = if first_attempt {
                build_initial_prompt(&ctx)
            } else {
                state.followup.take().unwrap_or_else(|| FALLBACK_FOLLOWUP.to_string())
            };
            state.cursor.push(prompt.clone());
            let resume = if first_attempt { None } else { state.session_token.clone() };
            (prompt, resume, state.cursor.clone())
        };

        self.tools.reset_calls();

        let cached = self.cache.lock().await.get(&cursor).cloned();
        let reply = match cached {
            Some(node) => {
                debug!(attempt = ctx.attempt_number, "conversation cache hit, replaying response");
                AgentReply {
                    session_id: node.session_token.unwrap_or_default(),
                    last_message_id: node.last_message_id.unwrap_or_default(),
                    text: node.response,
                }
            }
            None => {
                let request = AgentRequest {
                    prompt,
                    system_prompt: build_system_prompt(&ctx),
                    model: Some(self.config.model.clone()),
                    resume,
                    max_tokens: self.config.max_tokens,
                };
                let tool_ctx = ToolContext {
                    function_name: ctx.function_name.clone(),
                    target_object_path: ctx.target_object_path.clone(),
                    context_file_path: ctx.context_file_path.clone(),
                    compiler_flags: ctx.config.compiler_flags.clone(),
                    scratch_dir: ctx.config.output_dir.join("scratch"),
                };

                match self.query_with_deflection(request, &tool_ctx, abort.as_ref()).await? {
                    QueryOutcome::Reply(reply) => {
                        self.cache.lock().await.insert(
                            &cursor,
                            CacheNode {
                                response: reply.text.clone(),
                                session_token: Some(reply.session_id.clone()),
                                last_message_id: Some(reply.last_message_id.clone()),
                                follow_ups: HashMap::new(),
                            },
                        );
                        reply
                    }
                    QueryOutcome::Aborted => return Ok((self.background_match_failure(), ctx)),
                    QueryOutcome::Failed(message) => {
                        return Ok((PluginResult::failure(self.id(), self.name(), message), ctx));
                    }
                }
            }
        };

        {
            let mut state = self.state.lock().await;
            if state.session_token.is_none() && !reply.session_id.is_empty() {
                state.session_token = Some(reply.session_id.clone());
            }
        }

        match extract_c_block(&reply.text) {
            Some(code) => {
                ctx.generated_code = Some(code.clone());
                let result = PluginResult::success(self.id(), self.name())
                    .with_output(reply.text)
                    .with_data(serde_json::json!({ "generatedCode": code }));
                Ok((result, ctx))
            }
            None => {
                let result = PluginResult::failure(self.id(), self.name(), "Response contained no C code block")
                    .with_output(reply.text);
                Ok((result, ctx))
            }
        }
    }

    async fn prepare_retry(&self, ctx: PipelineContext, previous: &[AttemptSummary]) -> Result<PipelineContext> {
        let mut state = self.state.lock().await;
        let followup = feedback::build_followup(previous, &mut state.stall, self.config.stall_threshold);
        debug!(bytes = followup.len(), "retry follow-up built");
        state.followup = Some(followup);
        Ok(ctx)
    }

    fn set_foreground_abort(&self, signal: AbortSignal) {
        match self.abort.lock() {
            Ok(mut guard) => *guard = Some(signal),
            Err(poisoned) => *poisoned.into_inner() = Some(signal),
        }
    }

    async fn finalize(&self) -> Result<()> {
        if let Some(path) = &self.cache_path {
            self.cache.lock().await.save(path)?;
        }
        Ok(())
    }
}

fn build_system_prompt(ctx: &PipelineContext) -> String {
    format!(
        "You are matching a compiled C function against target assembly.\n\
         Function: {}\n\
         Produce one complete C function inside a ```c code block. The goal is source that \
         compiles to byte-identical assembly. Use the test_compile tool to check candidates \
         before answering.",
        ctx.function_name
    )
}

fn build_initial_prompt(ctx: &PipelineContext) -> String {
    let mut prompt = ctx.prompt_content.trim_end().to_string();

    if let Some(m2c) = &ctx.m2c_context {
        prompt.push_str("\n\nAn algorithmic decompiler produced this draft:\n```c\n");
        prompt.push_str(&m2c.generated_code);
        prompt.push_str("\n```\n");
        if let Some(error) = &m2c.compilation_error {
            prompt.push_str(&format!("It does not compile:\n{error}\n"));
        } else if let Some(diff) = &m2c.objdiff_output {
            prompt.push_str(&format!("It compiles but the assembly differs:\n{diff}\n"));
        }
        prompt.push_str("Use it as a starting point where it helps.");
    }

    prompt
}

/// First fenced C block of a response
fn extract_c_block(text: &str) -> Option<String> {
    let start = text.find("```c")?;
    let rest = &text[start + 4..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("```")?;
    let code = rest[..end].trim();
    if code.is_empty() { None } else { Some(code.to_string()) }
}
