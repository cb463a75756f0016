//! AgentTransport trait definition

use async_trait::async_trait;

use super::error::TransportError;
use super::types::{AgentReply, AgentRequest, QueryEnv};

/// Multi-turn agent transport.
///
/// One query drives a whole agentic conversation turn: the transport calls
/// the model, executes requested tools through the supplied executor, and
/// feeds results back until the model ends its turn. Sessions are resumable
/// through the token carried in [`AgentReply::session_id`].
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn query(&self, request: AgentRequest, env: QueryEnv<'_>) -> Result<AgentReply, TransportError>;
}
