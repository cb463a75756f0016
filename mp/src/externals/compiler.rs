//! Compiler wrapper contract

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::debug;

use crate::config::CompilerConfig;

/// One compilation of a candidate function
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub function_name: String,
    pub source: String,
    pub context_file_path: Option<PathBuf>,
    pub flags: String,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub success: bool,
    pub object_path: Option<PathBuf>,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile the candidate. `Err` means infrastructure trouble; a failed
    /// compilation is `Ok` with `success == false` and the diagnostics.
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutput>;
}

/// Shells out to a configured compiler command template.
///
/// `{src}`, `{obj}` and `{flags}` are substituted per invocation. The
/// candidate source is materialized next to the object, with the shared
/// context included when one is configured.
pub struct CommandCompiler {
    command: String,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutput> {
        tokio::fs::create_dir_all(&request.out_dir)
            .await
            .context("Failed to create compile output directory")?;

        let src_path = request.out_dir.join(format!("{}.c", request.function_name));
        let obj_path = request.out_dir.join(format!("{}.o", request.function_name));

        let source = match &request.context_file_path {
            Some(ctx) => format!("#include \"{}\"\n\n{}", ctx.display(), request.source),
            None => request.source.clone(),
        };
        tokio::fs::write(&src_path, source)
            .await
            .context(format!("Failed to write {}", src_path.display()))?;

        let command = self
            .command
            .replace("{src}", &src_path.display().to_string())
            .replace("{obj}", &obj_path.display().to_string())
            .replace("{flags}", &request.flags);

        debug!(%command, "running compiler");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh").arg("-c").arg(&command).output(),
        )
        .await
        .map_err(|_| eyre::eyre!("Compiler timed out after {:?}", self.timeout))?
        .context("Failed to execute compiler command")?;

        if output.status.success() && obj_path.exists() {
            return Ok(CompileOutput {
                success: true,
                object_path: Some(obj_path),
                errors: Vec::new(),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let errors: Vec<String> = stderr.lines().map(String::from).collect();
        debug!(error_count = errors.len(), "compilation failed");

        Ok(CompileOutput {
            success: false,
            object_path: None,
            errors,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_with(command: &str) -> CompilerConfig {
        CompilerConfig {
            command: command.to_string(),
            timeout_ms: 30_000,
        }
    }

    #[tokio::test]
    async fn test_command_compiler_success() {
        let temp = tempdir().unwrap();
        // Stand-in compiler: copy the source to the object path.
        let compiler = CommandCompiler::new(&config_with("cp {src} {obj}"));

        let request = CompileRequest {
            function_name: "walk".to_string(),
            source: "int walk(void) { return 0; }".to_string(),
            context_file_path: None,
            flags: String::new(),
            out_dir: temp.path().to_path_buf(),
        };

        let output = compiler.compile(&request).await.unwrap();
        assert!(output.success);
        assert!(output.object_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_command_compiler_failure_collects_stderr() {
        let temp = tempdir().unwrap();
        let compiler = CommandCompiler::new(&config_with("echo 'walk.c:1: error: oops' >&2; false"));

        let request = CompileRequest {
            function_name: "walk".to_string(),
            source: "garbage".to_string(),
            context_file_path: None,
            flags: String::new(),
            out_dir: temp.path().to_path_buf(),
        };

        let output = compiler.compile(&request).await.unwrap();
        assert!(!output.success);
        assert!(output.object_path.is_none());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("error: oops"));
    }

    #[tokio::test]
    async fn test_context_is_included() {
        let temp = tempdir().unwrap();
        let compiler = CommandCompiler::new(&config_with("cp {src} {obj}"));

        let request = CompileRequest {
            function_name: "walk".to_string(),
            source: "int walk(void) { return 0; }".to_string(),
            context_file_path: Some(PathBuf::from("/ctx/types.h")),
            flags: String::new(),
            out_dir: temp.path().to_path_buf(),
        };

        compiler.compile(&request).await.unwrap();

        let written = std::fs::read_to_string(temp.path().join("walk.c")).unwrap();
        assert!(written.starts_with("#include \"/ctx/types.h\""));
    }
}
