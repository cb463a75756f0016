//! Configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run-wide settings
    pub global: GlobalConfig,

    /// Per-plugin settings, keyed by plugin id
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .matchpipe.yml
        let local_config = PathBuf::from(".matchpipe.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/matchpipe/matchpipe.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("matchpipe").join("matchpipe.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Run-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Path to the shared C context (headers, type definitions)
    #[serde(rename = "context-path")]
    pub context_path: Option<PathBuf>,

    /// Attempt cap for the AI-powered flow
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Where results, objects, and caches land
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Directory scanned for prompt records
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: PathBuf,

    /// Flags appended to every compiler invocation
    #[serde(rename = "compiler-flags")]
    pub compiler_flags: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            context_path: None,
            max_retries: 25,
            output_dir: PathBuf::from("."),
            prompts_dir: PathBuf::from("prompts"),
            compiler_flags: String::new(),
        }
    }
}

/// Per-plugin settings. Unknown plugin ids are collected and ignored;
/// known ids without a stanza use defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub claude: AgentConfig,
    pub compiler: CompilerConfig,
    pub objdiff: ObjdiffConfig,
    pub m2c: M2cConfig,
    pub permuter: PermuterConfig,

    #[serde(flatten)]
    pub unknown: HashMap<String, serde_yaml::Value>,
}

/// Agent plugin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Tool executions allowed per attempt
    #[serde(rename = "tool-call-limit")]
    pub tool_call_limit: u32,

    /// Attempts without score improvement before stall recovery kicks in
    #[serde(rename = "stall-threshold")]
    pub stall_threshold: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            tool_call_limit: 50,
            stall_threshold: 3,
        }
    }
}

/// Compiler wrapper settings. The command is a template; `{src}`, `{obj}`
/// and `{flags}` are substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub command: String,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: "cc -c {src} -o {obj} {flags}".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Object-diff scorer settings. The command must print a JSON report with
/// a `differenceCount` field; `{target}`, `{current}` and `{symbol}` are
/// substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjdiffConfig {
    pub command: String,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ObjdiffConfig {
    fn default() -> Self {
        Self {
            command: "objdiff-cli diff --json {target} {current} {symbol}".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Algorithmic decompiler settings. `{asm}` and `{ctx}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct M2cConfig {
    pub command: String,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for M2cConfig {
    fn default() -> Self {
        Self {
            command: "m2c {asm} --context {ctx}".to_string(),
            timeout_ms: 120_000,
        }
    }
}

/// Mutation searcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermuterConfig {
    pub command: String,

    /// Spawn a search only when the last compiled attempt scored at or
    /// below this many differences
    #[serde(rename = "spawn-threshold")]
    pub spawn_threshold: u64,
}

impl Default for PermuterConfig {
    fn default() -> Self {
        Self {
            command: "permuter {dir}".to_string(),
            spawn_threshold: 30,
        }
    }
}
