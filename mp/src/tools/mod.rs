//! Tools the agent transport can execute on the model's behalf

pub mod compile;
pub mod executor;
pub mod traits;

pub use compile::TestCompileTool;
pub use executor::ToolExecutor;
pub use traits::{Tool, ToolCall, ToolContext, ToolDefinition, ToolResult};
