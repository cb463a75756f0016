//! Agent transport message types
//!
//! Modeled on the Anthropic Messages API but narrow enough to be served by
//! any transport that can hold a multi-turn session.

use serde::{Deserialize, Serialize};

use crate::tools::ToolExecutor;

/// A message in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: blocks,
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: blocks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A content block in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn from_api(s: &str) -> Self {
        match s {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// One query against the transport
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub system_prompt: String,
    /// Model override; the transport default applies when absent
    pub model: Option<String>,
    /// Session token to resume; a fresh session starts when absent
    pub resume: Option<String>,
    pub max_tokens: u32,
}

/// Messages emitted while a query runs
#[derive(Debug, Clone)]
pub enum AgentMessage {
    /// First message of every query; carries the session token
    System { session_id: String },
    Assistant { blocks: Vec<ContentBlock> },
    /// Tool results fed back to the model
    User { blocks: Vec<ContentBlock> },
    /// Terminal message
    Result { subtype: String, is_error: bool },
}

/// Final outcome of a successful query
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub session_id: String,
    pub last_message_id: String,
    /// Last assistant text of the conversation
    pub text: String,
}

/// Everything a transport needs to run one query end to end
pub struct QueryEnv<'a> {
    pub tools: &'a ToolExecutor,
    pub tool_ctx: &'a crate::tools::ToolContext,
    pub events: tokio::sync::mpsc::Sender<AgentMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert!(matches!(&msg.content[0], ContentBlock::Text { text } if text == "Hello"));
    }

    #[test]
    fn test_stop_reason_from_api() {
        assert_eq!(StopReason::from_api("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_api("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_api("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_api("anything"), StopReason::EndTurn);
    }

    #[test]
    fn test_content_block_serialization_tags() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "t1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "t1");
    }
}
