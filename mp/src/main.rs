//! mp - matching-decompilation pipeline runner
//!
//! CLI entry point: load configuration, assemble the standard pipeline,
//! and drive the benchmark.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result, bail};
use tracing::info;

use matchpipe::benchmark::{self, BenchmarkReport, BenchmarkRunner};
use matchpipe::cli::{Cli, Command};
use matchpipe::config::Config;
use matchpipe::plugins::standard_pipeline;

fn setup_logging(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Bench {
            prompts_dir,
            output_dir,
            max_retries,
        }) => {
            apply_overrides(&mut config, prompts_dir, output_dir, max_retries);
            run_bench(config).await
        }
        Some(Command::Run { prompt, max_retries }) => {
            apply_overrides(&mut config, None, None, max_retries);
            run_single(config, prompt).await
        }
        Some(Command::ListPlugins) => {
            list_plugins();
            Ok(())
        }
        None => {
            println!("matchpipe v{}", env!("CARGO_PKG_VERSION"));
            println!("  Model:       {}", config.plugins.claude.model);
            println!("  Prompts:     {}", config.global.prompts_dir.display());
            println!("  Max retries: {}", config.global.max_retries);
            println!("Run `mp bench` to start, or `mp --help` for the full surface.");
            Ok(())
        }
    }
}

fn apply_overrides(
    config: &mut Config,
    prompts_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    max_retries: Option<u32>,
) {
    if let Some(dir) = prompts_dir {
        config.global.prompts_dir = dir;
    }
    if let Some(dir) = output_dir {
        config.global.output_dir = dir;
    }
    if let Some(n) = max_retries {
        config.global.max_retries = n;
    }
}

async fn run_bench(config: Config) -> Result<()> {
    let prompts = benchmark::discover_prompts(&config.global.prompts_dir)?;
    if prompts.is_empty() {
        bail!("No prompts found in {}", config.global.prompts_dir.display());
    }
    info!(count = prompts.len(), "prompts discovered");

    let manager = standard_pipeline(&config)?;
    let config = Arc::new(config);
    let runner = BenchmarkRunner::new(manager, config.clone());

    let abort = runner.user_abort();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping after the current prompt");
            abort.abort();
        }
    });

    let run = runner.run(&prompts).await;

    let report = BenchmarkReport::new((*config).clone(), &run);
    let path = report.save(&config.global.output_dir)?;

    println!("Prompts:  {}", run.summary.total_prompts);
    println!(
        "Matched:  {} ({:.1}%)",
        run.summary.successful_prompts, run.summary.success_rate
    );
    println!("Attempts: {:.1} avg", run.summary.avg_attempts);
    println!("Duration: {} ms", run.summary.total_duration_ms);
    println!("Report:   {}", path.display());
    if run.aborted {
        println!("(stopped early, partial results preserved)");
    }

    Ok(())
}

async fn run_single(config: Config, prompt_dir: PathBuf) -> Result<()> {
    let prompt = benchmark::load_prompt(&prompt_dir)?;

    let manager = standard_pipeline(&config)?;
    let config = Arc::new(config);
    let runner = BenchmarkRunner::new(manager, config.clone());

    let run = runner.run(std::slice::from_ref(&prompt)).await;
    let report = BenchmarkReport::new((*config).clone(), &run);
    report.save(&config.global.output_dir)?;

    match run.results.first() {
        Some(result) if result.success => {
            let source = result
                .match_source
                .as_ref()
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{}: matched via {source}", result.function_name);
        }
        Some(result) => {
            println!(
                "{}: no match after {} attempt(s)",
                result.function_name,
                result.attempts.len()
            );
        }
        None => println!("No result recorded"),
    }

    Ok(())
}

fn list_plugins() {
    use matchpipe::plugins::*;

    println!("setup-flow:");
    println!("  {CONTEXT_PLUGIN_ID:<10} Materializes the shared C context");
    println!("programmatic-flow:");
    println!("  {M2C_PLUGIN_ID:<10} Algorithmic decompilation of the target assembly");
    println!("  {COMPILER_PLUGIN_ID:<10} Compiles the current candidate");
    println!("  {OBJDIFF_PLUGIN_ID:<10} Diffs the candidate object against the target");
    println!("main:");
    println!("  {AGENT_PLUGIN_ID:<10} Agentic code generation with session continuity");
    println!("  {COMPILER_PLUGIN_ID:<10} Compiles the current candidate");
    println!("  {OBJDIFF_PLUGIN_ID:<10} Diffs the candidate object against the target");
    println!("background:");
    println!("  {PERMUTER_PLUGIN_ID:<10} Mutation search over near-miss candidates");
}
