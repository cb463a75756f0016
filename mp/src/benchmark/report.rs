//! Persisted benchmark report

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::pipeline::PipelineRunResult;

use super::{BenchmarkRun, BenchmarkSummary};

pub const REPORT_FILE: &str = "benchmark-results.json";

/// Everything a benchmark run produced, as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub timestamp: DateTime<Utc>,
    pub config: Config,
    pub results: Vec<PipelineRunResult>,
    pub summary: BenchmarkSummary,
}

impl BenchmarkReport {
    pub fn new(config: Config, run: &BenchmarkRun) -> Self {
        Self {
            timestamp: Utc::now(),
            config,
            results: run.results.clone(),
            summary: run.summary.clone(),
        }
    }

    /// Write the report as pretty JSON into the output directory
    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .context(format!("Failed to create output directory {}", output_dir.display()))?;

        let path = output_dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize benchmark report")?;
        fs::write(&path, json).context(format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), "benchmark report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_report_round_trip() {
        let run = BenchmarkRun {
            results: Vec::new(),
            summary: BenchmarkSummary {
                total_prompts: 0,
                successful_prompts: 0,
                success_rate: 0.0,
                avg_attempts: 0.0,
                total_duration_ms: 12,
            },
            aborted: false,
        };

        let temp = tempdir().unwrap();
        let report = BenchmarkReport::new(Config::default(), &run);
        let path = report.save(temp.path()).unwrap();

        let loaded: BenchmarkReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.summary.total_duration_ms, 12);
        assert_eq!(loaded.config.global.max_retries, 25);
    }

    #[test]
    fn test_save_creates_output_dir() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("a/b");

        let run = BenchmarkRun {
            results: Vec::new(),
            summary: BenchmarkSummary::compute(&[], 0),
            aborted: false,
        };
        let report = BenchmarkReport::new(Config::default(), &run);

        let path = report.save(&nested).unwrap();
        assert!(path.exists());
    }
}
