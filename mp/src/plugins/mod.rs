//! Plugin adapters and standard pipeline assembly

pub mod agent;
pub mod compiler;
pub mod context_setup;
pub mod m2c;
pub mod objdiff;
pub mod permuter;

pub use agent::{AGENT_PLUGIN_ID, AgentPlugin, BACKGROUND_MATCH_ERROR};
pub use compiler::{COMPILER_PLUGIN_ID, CompilerPlugin};
pub use context_setup::{CONTEXT_PLUGIN_ID, ContextSetupPlugin};
pub use m2c::{M2C_PLUGIN_ID, M2cPlugin};
pub use objdiff::{OBJDIFF_PLUGIN_ID, ObjdiffPlugin};
pub use permuter::{PERMUTER_PLUGIN_ID, PermuterPlugin};

use std::sync::Arc;

use eyre::Result;

use crate::agent::SdkTransport;
use crate::config::Config;
use crate::externals::{
    CommandCompiler, CommandDecompiler, CommandDiffScorer, CommandSearcher, Compiler, DiffScorer,
    StdioPrompter,
};
use crate::pipeline::{BackgroundTaskCoordinator, PluginManager};
use crate::tools::{TestCompileTool, ToolExecutor};

/// Assemble the standard pipeline from configuration:
/// context setup, then m2c + scorers, then the agent + scorers raced
/// against the permuter.
pub fn standard_pipeline(config: &Config) -> Result<PluginManager> {
    let compiler: Arc<dyn Compiler> = Arc::new(CommandCompiler::new(&config.plugins.compiler));
    let scorer: Arc<dyn DiffScorer> = Arc::new(CommandDiffScorer::new(&config.plugins.objdiff));
    let decompiler = Arc::new(CommandDecompiler::new(&config.plugins.m2c));
    let searcher = Arc::new(CommandSearcher::new(&config.plugins.permuter));

    let transport = Arc::new(SdkTransport::from_config(&config.plugins.claude)?);

    let mut tools = ToolExecutor::new(config.plugins.claude.tool_call_limit);
    tools.add_tool(Arc::new(TestCompileTool::new(compiler.clone(), scorer.clone())));

    let agent = Arc::new(
        AgentPlugin::new(transport, tools, config.plugins.claude.clone())
            .with_prompter(Arc::new(StdioPrompter))
            .with_cache_path(config.global.output_dir.join("conversation-cache.json")),
    );

    let compiler_plugin = Arc::new(CompilerPlugin::new(compiler));
    let objdiff_plugin = Arc::new(ObjdiffPlugin::new(scorer));

    let mut coordinator = BackgroundTaskCoordinator::new();
    coordinator.register(Arc::new(PermuterPlugin::new(
        searcher,
        &config.plugins.permuter,
        config.global.output_dir.join("permuter"),
    )));

    let mut manager = PluginManager::new();
    manager.register_setup(Arc::new(ContextSetupPlugin));
    manager.register_programmatic(Arc::new(M2cPlugin::new(decompiler)));
    manager.register_programmatic(compiler_plugin.clone());
    manager.register_programmatic(objdiff_plugin.clone());
    manager.register_main(agent);
    manager.register_main(compiler_plugin);
    manager.register_main(objdiff_plugin);
    manager.set_coordinator(Arc::new(coordinator));

    Ok(manager)
}
