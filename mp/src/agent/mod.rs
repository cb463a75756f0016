//! Agent transport - the conversation layer behind the agentic plugin

pub mod client;
pub mod error;
pub mod sdk;
pub mod types;

pub use client::AgentTransport;
pub use error::{TransportError, UsageLimitKind};
pub use sdk::SdkTransport;
pub use types::{AgentMessage, AgentReply, AgentRequest, ContentBlock, Message, QueryEnv, Role, StopReason};
