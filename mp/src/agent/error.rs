//! Agent transport error types

use thiserror::Error;

/// Which quota ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLimitKind {
    RateLimit,
    Billing,
}

/// Errors surfaced by an agent transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Usage limit ({kind:?}): {message}")]
    UsageLimit { kind: UsageLimitKind, message: String },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Quota exhaustion (rate-limit or billing), deflected to the user
    pub fn is_usage_limit(&self) -> bool {
        matches!(self, TransportError::UsageLimit { .. })
    }

    pub fn usage_limit_kind(&self) -> Option<UsageLimitKind> {
        match self {
            TransportError::UsageLimit { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
