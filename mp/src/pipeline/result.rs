//! Result model for plugin executions, attempts, and whole pipeline runs

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single plugin execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Success,
    Failure,
    Skipped,
}

/// Report fragment a plugin may attach to its result. Decorative only,
/// the engine never reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

/// Output text used when a plugin is skipped after an earlier failure
pub const SKIPPED_OUTPUT: &str = "Skipped due to previous plugin failure";

/// Result of one plugin execution within an attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResult {
    pub plugin_id: String,
    pub plugin_name: String,
    pub status: PluginStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<ReportSection>,
}

impl PluginResult {
    pub fn success(plugin_id: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_name: plugin_name.into(),
            status: PluginStatus::Success,
            duration_ms: 0,
            output: None,
            error: None,
            data: None,
            sections: Vec::new(),
        }
    }

    pub fn failure(
        plugin_id: impl Into<String>,
        plugin_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_name: plugin_name.into(),
            status: PluginStatus::Failure,
            duration_ms: 0,
            output: None,
            error: Some(error.into()),
            data: None,
            sections: Vec::new(),
        }
    }

    pub fn skipped(plugin_id: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_name: plugin_name.into(),
            status: PluginStatus::Skipped,
            duration_ms: 0,
            output: Some(SKIPPED_OUTPUT.to_string()),
            error: None,
            data: None,
            sections: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == PluginStatus::Success
    }

    pub fn failed(&self) -> bool {
        self.status == PluginStatus::Failure
    }

    pub fn is_skipped(&self) -> bool {
        self.status == PluginStatus::Skipped
    }
}

/// One full pass through a plugin sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_number: u32,
    pub plugin_results: Vec<PluginResult>,
    pub success: bool,
    pub duration_ms: u64,
    pub start_timestamp: DateTime<Utc>,
}

impl AttemptResult {
    /// Condense into the per-attempt summary carried between retries.
    /// Skipped entries are dropped.
    pub fn summarize(&self) -> AttemptSummary {
        AttemptSummary {
            attempt_number: self.attempt_number,
            results: self
                .plugin_results
                .iter()
                .filter(|r| !r.is_skipped())
                .map(|r| (r.plugin_id.clone(), r.clone()))
                .collect(),
        }
    }
}

/// Summary of a prior attempt, keyed by plugin id
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub attempt_number: u32,
    pub results: HashMap<String, PluginResult>,
}

impl AttemptSummary {
    pub fn result(&self, plugin_id: &str) -> Option<&PluginResult> {
        self.results.get(plugin_id)
    }
}

/// Where a successful match came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    ProgrammaticFlow,
    Claude,
    Background(String),
}

impl MatchSource {
    pub fn as_str(&self) -> &str {
        match self {
            MatchSource::ProgrammaticFlow => "programmatic-flow",
            MatchSource::Claude => "claude",
            MatchSource::Background(id) => id,
        }
    }
}

impl Serialize for MatchSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MatchSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "programmatic-flow" => MatchSource::ProgrammaticFlow,
            "claude" => MatchSource::Claude,
            _ => MatchSource::Background(s),
        })
    }
}

/// Result of a background search task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTaskResult {
    pub task_id: String,
    pub plugin_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub start_timestamp: DateTime<Utc>,
    pub triggered_by_attempt: u32,
    pub data: serde_json::Value,
}

/// Result of one prompt run through the full pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub prompt_path: PathBuf,
    pub function_name: String,
    pub success: bool,
    pub attempts: Vec<AttemptResult>,
    pub total_duration_ms: u64,
    pub setup_flow: AttemptResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub programmatic_flow: Option<AttemptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_tasks: Option<Vec<BackgroundTaskResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_source: Option<MatchSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_with(results: Vec<PluginResult>, success: bool) -> AttemptResult {
        AttemptResult {
            attempt_number: 1,
            plugin_results: results,
            success,
            duration_ms: 5,
            start_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_skipped_result_shape() {
        let result = PluginResult::skipped("objdiff", "Object Diff");
        assert_eq!(result.status, PluginStatus::Skipped);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(result.output.as_deref(), Some(SKIPPED_OUTPUT));
    }

    #[test]
    fn test_summarize_excludes_skipped() {
        let attempt = attempt_with(
            vec![
                PluginResult::failure("claude", "Claude Agent", "boom"),
                PluginResult::skipped("compiler", "Compiler"),
                PluginResult::skipped("objdiff", "Object Diff"),
            ],
            false,
        );

        let summary = attempt.summarize();
        assert_eq!(summary.results.len(), 1);
        assert!(summary.result("claude").is_some());
        assert!(summary.result("compiler").is_none());
    }

    #[test]
    fn test_match_source_round_trip() {
        for source in [
            MatchSource::ProgrammaticFlow,
            MatchSource::Claude,
            MatchSource::Background("permuter".to_string()),
        ] {
            let json = serde_json::to_string(&source).unwrap();
            let back: MatchSource = serde_json::from_str(&json).unwrap();
            assert_eq!(back, source);
        }
    }

    #[test]
    fn test_match_source_strings() {
        assert_eq!(MatchSource::ProgrammaticFlow.as_str(), "programmatic-flow");
        assert_eq!(MatchSource::Claude.as_str(), "claude");
        assert_eq!(MatchSource::Background("permuter".into()).as_str(), "permuter");
    }

    #[test]
    fn test_plugin_result_builders() {
        let ok = PluginResult::success("m2c", "M2C").with_output("int f(void) { return 1; }");
        assert!(ok.succeeded());
        assert!(ok.error.is_none());

        let bad = PluginResult::failure("compiler", "Compiler", "syntax error");
        assert!(bad.failed());
        assert_eq!(bad.error.as_deref(), Some("syntax error"));
    }
}
