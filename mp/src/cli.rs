//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Matching-decompilation pipeline runner
#[derive(Parser)]
#[command(
    name = "mp",
    about = "Coordinates decompilation strategies until a candidate compiles to byte-identical assembly",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the benchmark over a prompts directory
    Bench {
        /// Prompts directory (defaults to the configured one)
        prompts_dir: Option<PathBuf>,

        /// Where results and scratch files land
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Attempt cap for the AI-powered flow
        #[arg(short, long)]
        max_retries: Option<u32>,
    },

    /// Run a single prompt directory
    Run {
        /// Prompt directory (holds prompt.md, target.s, target.o)
        prompt: PathBuf,

        /// Attempt cap for the AI-powered flow
        #[arg(short, long)]
        max_retries: Option<u32>,
    },

    /// List the plugins of the standard pipeline
    ListPlugins,
}
