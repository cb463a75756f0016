//! Cooperative cancellation primitives

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Notify;

/// Benchmark-wide abort requested by the user (pause/quit).
///
/// Raised through `eyre::Report` and recovered by downcast: it passes
/// untouched through `run_attempt` and `run_pipeline` and stops prompt
/// iteration in the benchmark driver, keeping results collected so far.
#[derive(Debug, Clone, Error)]
#[error("pipeline aborted: {reason}")]
pub struct PipelineAbort {
    pub reason: String,
}

impl PipelineAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Single-shot cancellation signal.
///
/// Clones share the same underlying flag. `abort` is write-once; once fired
/// the signal stays fired until the holder replaces it with a fresh one.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent.
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolve once the signal fires. Resolves immediately if already fired.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}
