//! HTTP-backed agent transport with in-memory session resumption
//!
//! Drives the Anthropic Messages API in an agentic loop: call the model,
//! execute requested tools, feed results back, repeat until the turn ends.
//! Sessions are held in memory keyed by token so a later query can resume
//! the same conversation.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::tools::{ToolCall, ToolDefinition};

use super::client::AgentTransport;
use super::error::{TransportError, UsageLimitKind};
use super::types::{AgentMessage, AgentReply, AgentRequest, ContentBlock, Message, QueryEnv, StopReason};

const MAX_TURNS: u32 = 64;

struct Session {
    system_prompt: String,
    messages: Vec<Message>,
}

struct Completion {
    text: Option<String>,
    tool_calls: Vec<ToolCall>,
    stop_reason: StopReason,
}

pub struct SdkTransport {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    http: Client,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SdkTransport {
    /// Create a transport from configuration. The API key is read from the
    /// environment variable the config names.
    pub fn from_config(config: &AgentConfig) -> Result<Self, TransportError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            TransportError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env))
        })?;

        let http = Client::builder().build().map_err(TransportError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            max_tokens: config.max_tokens,
            http,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn build_request_body(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(tools);
        }

        body
    }

    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<Completion, TransportError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(model, system_prompt, messages, tools, max_tokens);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, message));
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(parse_completion(api_response))
    }
}

#[async_trait]
impl AgentTransport for SdkTransport {
    async fn query(&self, request: AgentRequest, env: QueryEnv<'_>) -> Result<AgentReply, TransportError> {
        let session_id = request.resume.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&session_id).unwrap_or_else(|| Session {
                system_prompt: request.system_prompt.clone(),
                messages: Vec::new(),
            })
        };

        let _ = env
            .events
            .send(AgentMessage::System {
                session_id: session_id.clone(),
            })
            .await;

        session.messages.push(Message::user(request.prompt.clone()));

        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let tool_defs = env.tools.definitions();
        let max_tokens = request.max_tokens.min(self.max_tokens);

        let mut final_text = String::new();
        let mut turns = 0u32;

        let outcome = loop {
            turns += 1;
            if turns > MAX_TURNS {
                break Err(TransportError::InvalidResponse(format!(
                    "Turn limit ({MAX_TURNS}) exceeded"
                )));
            }

            let completion = match self
                .complete(&model, &session.system_prompt, &session.messages, &tool_defs, max_tokens)
                .await
            {
                Ok(completion) => completion,
                Err(e) => break Err(e),
            };

            let mut blocks = Vec::new();
            if let Some(text) = &completion.text {
                final_text = text.clone();
                blocks.push(ContentBlock::Text { text: text.clone() });
            }
            for call in &completion.tool_calls {
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
            }
            session.messages.push(Message::assistant_blocks(blocks.clone()));
            let _ = env.events.send(AgentMessage::Assistant { blocks }).await;

            match completion.stop_reason {
                StopReason::ToolUse => {
                    let mut result_blocks = Vec::new();
                    for call in &completion.tool_calls {
                        debug!(tool = %call.name, "transport executing tool");
                        let result = env.tools.execute(call, env.tool_ctx).await;
                        result_blocks.push(ContentBlock::ToolResult {
                            tool_use_id: call.id.clone(),
                            content: result.content,
                            is_error: result.is_error,
                        });
                    }
                    session.messages.push(Message::user_blocks(result_blocks.clone()));
                    let _ = env.events.send(AgentMessage::User { blocks: result_blocks }).await;
                }
                StopReason::MaxTokens => {
                    session.messages.push(Message::user(
                        "Continue from where you left off. Your previous response was truncated.",
                    ));
                }
                StopReason::EndTurn | StopReason::StopSequence => break Ok(()),
            }
        };

        // Keep the conversation resumable whatever happened.
        self.sessions.lock().await.insert(session_id.clone(), session);

        match outcome {
            Ok(()) => {
                let _ = env
                    .events
                    .send(AgentMessage::Result {
                        subtype: "success".to_string(),
                        is_error: false,
                    })
                    .await;
                Ok(AgentReply {
                    session_id,
                    last_message_id: Uuid::new_v4().to_string(),
                    text: final_text,
                })
            }
            Err(e) => {
                let _ = env
                    .events
                    .send(AgentMessage::Result {
                        subtype: e.to_string(),
                        is_error: true,
                    })
                    .await;
                Err(e)
            }
        }
    }
}

/// Map an API failure onto the transport error taxonomy
fn classify_failure(status: u16, message: String) -> TransportError {
    if status == 429 {
        return TransportError::UsageLimit {
            kind: UsageLimitKind::RateLimit,
            message,
        };
    }
    if status == 402 || message.contains("billing") || message.contains("credit balance") {
        return TransportError::UsageLimit {
            kind: UsageLimitKind::Billing,
            message,
        };
    }
    TransportError::Api { status, message }
}

fn parse_completion(api_response: ApiResponse) -> Completion {
    let mut text = None;
    let mut tool_calls = Vec::new();

    for block in api_response.content {
        match block {
            ApiContentBlock::Text { text: t } => {
                text = Some(t);
            }
            ApiContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall { id, name, input });
            }
        }
    }

    Completion {
        text,
        tool_calls,
        stop_reason: StopReason::from_api(api_response.stop_reason.as_deref().unwrap_or("end_turn")),
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}
