//! User prompt contract for usage-limit deflection

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::info;

/// What the user wants done about an exhausted quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLimitDecision {
    /// Retry the same underlying call
    Continue,
    /// Raise a benchmark-wide abort
    Abort,
}

#[async_trait]
pub trait UserPrompter: Send + Sync {
    async fn ask_usage_limit(&self, message: &str) -> Result<UsageLimitDecision>;
}

/// Asks on the terminal. EOF or anything other than "continue"/"c" aborts.
pub struct StdioPrompter;

#[async_trait]
impl UserPrompter for StdioPrompter {
    async fn ask_usage_limit(&self, message: &str) -> Result<UsageLimitDecision> {
        info!(%message, "usage limit hit, asking user");
        println!("Usage limit reached: {message}");
        println!("Type 'continue' to retry once the quota refreshes, anything else to abort.");

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .context("Prompt task failed")?
        .context("Failed to read from stdin")?;

        match line.trim().to_lowercase().as_str() {
            "continue" | "c" => Ok(UsageLimitDecision::Continue),
            _ => Ok(UsageLimitDecision::Abort),
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock prompter returning a fixed decision
    pub struct MockPrompter {
        pub decision: UsageLimitDecision,
        pub asked: AtomicUsize,
    }

    impl MockPrompter {
        pub fn answering(decision: UsageLimitDecision) -> Self {
            Self {
                decision,
                asked: AtomicUsize::new(0),
            }
        }

        pub fn ask_count(&self) -> usize {
            self.asked.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserPrompter for MockPrompter {
        async fn ask_usage_limit(&self, _message: &str) -> Result<UsageLimitDecision> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision)
        }
    }
}
