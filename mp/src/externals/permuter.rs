//! Mutation searcher contract

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::config::PermuterConfig;
use crate::pipeline::AbortSignal;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub function_name: String,
    pub source: String,
    pub context_file_path: Option<PathBuf>,
    pub target_object_path: PathBuf,
    pub compiler_flags: String,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchOutcome {
    pub matched: bool,
    pub score: u64,
    pub code: Option<String>,
}

#[async_trait]
pub trait MutationSearcher: Send + Sync {
    /// Mutate the candidate toward a byte-identical match. Must honor
    /// `cancel` and return best-effort when it fires.
    async fn search(&self, request: &SearchRequest, cancel: AbortSignal) -> Result<SearchOutcome>;
}

/// Shells out to a configured search command.
///
/// The search directory is seeded with `base.c` and a `target.o` symlink
/// source; `{dir}` is substituted. The tool prints a JSON outcome with
/// `matched`, `score` and optional `code` as its last stdout line.
pub struct CommandSearcher {
    command: String,
}

impl CommandSearcher {
    pub fn new(config: &PermuterConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }
}

#[async_trait]
impl MutationSearcher for CommandSearcher {
    async fn search(&self, request: &SearchRequest, cancel: AbortSignal) -> Result<SearchOutcome> {
        tokio::fs::create_dir_all(&request.scratch_dir)
            .await
            .context("Failed to create search scratch directory")?;

        tokio::fs::write(request.scratch_dir.join("base.c"), &request.source)
            .await
            .context("Failed to seed search directory")?;
        tokio::fs::copy(&request.target_object_path, request.scratch_dir.join("target.o"))
            .await
            .context("Failed to copy target object into search directory")?;
        tokio::fs::write(request.scratch_dir.join("flags.txt"), &request.compiler_flags)
            .await
            .context("Failed to record compiler flags")?;

        let command = self
            .command
            .replace("{dir}", &request.scratch_dir.display().to_string());

        debug!(%command, function = %request.function_name, "starting mutation search");
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn search command")?;

        let output = tokio::select! {
            result = child.wait_with_output() => result.context("Failed to wait for search command")?,
            _ = cancel.cancelled() => {
                debug!(function = %request.function_name, "search cancelled");
                return Ok(SearchOutcome {
                    matched: false,
                    score: u64::MAX,
                    code: None,
                });
            }
        };

        if !output.status.success() {
            bail!("Search command exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default();

        serde_json::from_str(last_line).context("Failed to parse search outcome")
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::time::Duration;

    /// Mock searcher that optionally sleeps before reporting its outcome
    pub struct MockSearcher {
        pub matched: bool,
        pub delay_ms: u64,
    }

    #[async_trait]
    impl MutationSearcher for MockSearcher {
        async fn search(&self, _request: &SearchRequest, cancel: AbortSignal) -> Result<SearchOutcome> {
            if self.delay_ms > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {}
                    _ = cancel.cancelled() => {
                        return Ok(SearchOutcome { matched: false, score: u64::MAX, code: None });
                    }
                }
            }
            Ok(SearchOutcome {
                matched: self.matched,
                score: if self.matched { 0 } else { 10 },
                code: self.matched.then(|| "int walk(void) { return 0; }".to_string()),
            })
        }
    }
}
