//! Prompt record discovery and loading
//!
//! A prompt is a directory holding `prompt.md` (the instruction text),
//! `target.s` (the target assembly) and `target.o` (the target object).
//! The directory name is the function name.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, bail};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PROMPT_FILE: &str = "prompt.md";
pub const ASM_FILE: &str = "target.s";
pub const OBJECT_FILE: &str = "target.o";

/// One benchmark prompt
#[derive(Debug, Clone)]
pub struct PromptRecord {
    pub path: PathBuf,
    pub content: String,
    pub function_name: String,
    pub target_object_path: PathBuf,
    pub asm: String,
}

/// Load a single prompt directory
pub fn load_prompt(dir: &Path) -> Result<PromptRecord> {
    let function_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| eyre::eyre!("Prompt directory has no usable name: {}", dir.display()))?;

    let prompt_path = dir.join(PROMPT_FILE);
    let content = fs::read_to_string(&prompt_path)
        .context(format!("Failed to read {}", prompt_path.display()))?;

    let asm_path = dir.join(ASM_FILE);
    let asm = fs::read_to_string(&asm_path).context(format!("Failed to read {}", asm_path.display()))?;

    let target_object_path = dir.join(OBJECT_FILE);
    if !target_object_path.exists() {
        bail!("Missing target object: {}", target_object_path.display());
    }

    Ok(PromptRecord {
        path: prompt_path,
        content,
        function_name,
        target_object_path,
        asm,
    })
}

/// Walk the prompts directory and collect every complete prompt record,
/// sorted by function name. Incomplete directories are skipped with a
/// warning.
pub fn discover_prompts(root: &Path) -> Result<Vec<PromptRecord>> {
    if !root.is_dir() {
        bail!("Prompts directory not found: {}", root.display());
    }

    let mut prompts = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && entry.file_name() == PROMPT_FILE {
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            match load_prompt(dir) {
                Ok(prompt) => {
                    debug!(function = %prompt.function_name, "discovered prompt");
                    prompts.push(prompt);
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping incomplete prompt directory");
                }
            }
        }
    }

    prompts.sort_by(|a, b| a.function_name.cmp(&b.function_name));
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_prompt(root: &Path, name: &str, with_object: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PROMPT_FILE), format!("Decompile {name}")).unwrap();
        fs::write(dir.join(ASM_FILE), "blr\n").unwrap();
        if with_object {
            fs::write(dir.join(OBJECT_FILE), b"\x7fELF").unwrap();
        }
    }

    #[test]
    fn test_load_prompt() {
        let temp = tempdir().unwrap();
        write_prompt(temp.path(), "walk", true);

        let prompt = load_prompt(&temp.path().join("walk")).unwrap();
        assert_eq!(prompt.function_name, "walk");
        assert_eq!(prompt.content, "Decompile walk");
        assert_eq!(prompt.asm, "blr\n");
        assert!(prompt.target_object_path.ends_with("walk/target.o"));
    }

    #[test]
    fn test_load_prompt_missing_object() {
        let temp = tempdir().unwrap();
        write_prompt(temp.path(), "walk", false);

        assert!(load_prompt(&temp.path().join("walk")).is_err());
    }

    #[test]
    fn test_discover_sorts_and_skips_incomplete() {
        let temp = tempdir().unwrap();
        write_prompt(temp.path(), "zeta", true);
        write_prompt(temp.path(), "alpha", true);
        write_prompt(temp.path(), "broken", false);

        let prompts = discover_prompts(temp.path()).unwrap();
        let names: Vec<&str> = prompts.iter().map(|p| p.function_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_discover_missing_root_errors() {
        let temp = tempdir().unwrap();
        assert!(discover_prompts(&temp.path().join("nope")).is_err());
    }
}
