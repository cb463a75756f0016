//! Object-diff scorer contract

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::config::ObjdiffConfig;

/// Handle to an object file registered with the scorer
#[derive(Debug, Clone)]
pub struct ParsedObject {
    pub path: PathBuf,
    pub label: String,
}

/// Outcome of diffing one symbol between two objects
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Target-side disassembly
    pub left: Option<String>,
    /// Candidate-side disassembly
    pub right: Option<String>,
    pub difference_count: u64,
}

#[async_trait]
pub trait DiffScorer: Send + Sync {
    async fn parse_object(&self, path: &Path, label: &str) -> Result<ParsedObject>;

    /// Diff `symbol` between the target and the candidate
    async fn run_diff(&self, target: &ParsedObject, current: &ParsedObject, symbol: &str) -> Result<DiffReport>;

    /// Resolve a symbol by name, if the object defines it
    async fn find_symbol(&self, object: &ParsedObject, name: &str) -> Result<Option<String>>;

    /// Disassembly of one symbol from one object
    async fn assembly_for_symbol(&self, object: &ParsedObject, name: &str) -> Result<String>;
}

/// JSON report the external diff tool prints on stdout
#[derive(Debug, Deserialize)]
struct CommandReport {
    #[serde(rename = "differenceCount")]
    difference_count: u64,
    left: Option<String>,
    right: Option<String>,
    #[serde(default = "default_found")]
    found: bool,
}

fn default_found() -> bool {
    true
}

/// Shells out to a configured diff command template.
///
/// `{target}`, `{current}` and `{symbol}` are substituted per invocation;
/// the tool must print a JSON report with `differenceCount`, optional
/// `left`/`right` columns, and a `found` flag for the symbol lookup.
pub struct CommandDiffScorer {
    command: String,
    timeout: Duration,
}

impl CommandDiffScorer {
    pub fn new(config: &ObjdiffConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    async fn run_tool(&self, target: &Path, current: &Path, symbol: &str) -> Result<CommandReport> {
        let command = self
            .command
            .replace("{target}", &target.display().to_string())
            .replace("{current}", &current.display().to_string())
            .replace("{symbol}", symbol);

        debug!(%command, "running object diff");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh").arg("-c").arg(&command).output(),
        )
        .await
        .map_err(|_| eyre::eyre!("Object diff timed out after {:?}", self.timeout))?
        .context("Failed to execute object diff command")?;

        if !output.status.success() {
            bail!(
                "Object diff exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse object diff report")
    }
}

#[async_trait]
impl DiffScorer for CommandDiffScorer {
    async fn parse_object(&self, path: &Path, label: &str) -> Result<ParsedObject> {
        if !path.exists() {
            bail!("Object file not found: {}", path.display());
        }
        Ok(ParsedObject {
            path: path.to_path_buf(),
            label: label.to_string(),
        })
    }

    async fn run_diff(&self, target: &ParsedObject, current: &ParsedObject, symbol: &str) -> Result<DiffReport> {
        let report = self.run_tool(&target.path, &current.path, symbol).await?;
        if !report.found {
            bail!("Symbol {symbol} not present in diff inputs");
        }
        Ok(DiffReport {
            left: report.left,
            right: report.right,
            difference_count: report.difference_count,
        })
    }

    async fn find_symbol(&self, object: &ParsedObject, name: &str) -> Result<Option<String>> {
        // Self-diff resolves the symbol without needing a second object.
        let report = self.run_tool(&object.path, &object.path, name).await?;
        Ok(report.found.then(|| name.to_string()))
    }

    async fn assembly_for_symbol(&self, object: &ParsedObject, name: &str) -> Result<String> {
        let report = self.run_tool(&object.path, &object.path, name).await?;
        if !report.found {
            bail!("Symbol {name} not present in {}", object.path.display());
        }
        Ok(report.right.or(report.left).unwrap_or_default())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scorer_with(command: &str) -> CommandDiffScorer {
        CommandDiffScorer::new(&ObjdiffConfig {
            command: command.to_string(),
            timeout_ms: 30_000,
        })
    }

    #[tokio::test]
    async fn test_parse_object_requires_existing_file() {
        let temp = tempdir().unwrap();
        let scorer = scorer_with("true");

        assert!(scorer.parse_object(&temp.path().join("nope.o"), "target").await.is_err());

        let path = temp.path().join("real.o");
        std::fs::write(&path, b"obj").unwrap();
        let parsed = scorer.parse_object(&path, "target").await.unwrap();
        assert_eq!(parsed.label, "target");
    }

    #[tokio::test]
    async fn test_run_diff_parses_report() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.o");
        std::fs::write(&path, b"obj").unwrap();

        let scorer = scorer_with(r#"echo '{"differenceCount": 7, "right": "asm here"}'"#);
        let obj = scorer.parse_object(&path, "target").await.unwrap();

        let report = scorer.run_diff(&obj, &obj, "walk").await.unwrap();
        assert_eq!(report.difference_count, 7);
        assert_eq!(report.right.as_deref(), Some("asm here"));
    }

    #[tokio::test]
    async fn test_find_symbol_honors_found_flag() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.o");
        std::fs::write(&path, b"obj").unwrap();

        let scorer = scorer_with(r#"echo '{"differenceCount": 0, "found": false}'"#);
        let obj = scorer.parse_object(&path, "target").await.unwrap();

        assert!(scorer.find_symbol(&obj, "walk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_diff_tool_failure_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.o");
        std::fs::write(&path, b"obj").unwrap();

        let scorer = scorer_with("echo broken >&2; false");
        let obj = scorer.parse_object(&path, "target").await.unwrap();

        assert!(scorer.run_diff(&obj, &obj, "walk").await.is_err());
    }
}
