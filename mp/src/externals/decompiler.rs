//! Algorithmic decompiler contract

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use tracing::debug;

use crate::config::M2cConfig;

#[derive(Debug, Clone)]
pub struct DecompileRequest {
    pub function_name: String,
    pub asm: String,
    pub context_file_path: Option<PathBuf>,
    pub scratch_dir: PathBuf,
}

#[async_trait]
pub trait Decompiler: Send + Sync {
    /// Translate target assembly into candidate C source
    async fn decompile(&self, request: &DecompileRequest) -> Result<String>;
}

/// Shells out to a configured decompiler command template.
///
/// `{asm}` and `{ctx}` are substituted; the tool prints C on stdout.
pub struct CommandDecompiler {
    command: String,
    timeout: Duration,
}

impl CommandDecompiler {
    pub fn new(config: &M2cConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl Decompiler for CommandDecompiler {
    async fn decompile(&self, request: &DecompileRequest) -> Result<String> {
        tokio::fs::create_dir_all(&request.scratch_dir)
            .await
            .context("Failed to create decompiler scratch directory")?;

        let asm_path = request.scratch_dir.join(format!("{}.s", request.function_name));
        tokio::fs::write(&asm_path, &request.asm)
            .await
            .context(format!("Failed to write {}", asm_path.display()))?;

        let ctx = request
            .context_file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/dev/null".to_string());

        let command = self
            .command
            .replace("{asm}", &asm_path.display().to_string())
            .replace("{ctx}", &ctx);

        debug!(%command, "running decompiler");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh").arg("-c").arg(&command).output(),
        )
        .await
        .map_err(|_| eyre::eyre!("Decompiler timed out after {:?}", self.timeout))?
        .context("Failed to execute decompiler command")?;

        if !output.status.success() {
            bail!(
                "Decompiler exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let code = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if code.is_empty() {
            bail!("Decompiler produced no output");
        }
        Ok(code)
    }
}
