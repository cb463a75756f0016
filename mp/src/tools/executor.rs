//! ToolExecutor - dispatches tool calls under a per-attempt budget

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use super::{Tool, ToolCall, ToolContext, ToolDefinition, ToolResult};

/// Dispatches tool calls and enforces the per-attempt call limit.
///
/// Once the counter passes the limit every invocation returns a refusal
/// payload instead of executing, until `reset_calls`.
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
    max_calls: u32,
    calls: AtomicU32,
}

impl ToolExecutor {
    pub fn new(max_calls: u32) -> Self {
        Self {
            tools: HashMap::new(),
            max_calls,
            calls: AtomicU32::new(0),
        }
    }

    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions advertised to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Restart the per-attempt counter
    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn calls_used(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Execute a tool call, refusing past the call limit
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let used = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if used > self.max_calls {
            warn!(tool = %call.name, used, limit = self.max_calls, "tool call limit exceeded");
            return ToolResult::error(format!(
                "Tool call limit of {} reached for this attempt. No further tool calls will be executed; \
                 finish your answer with the best candidate you have.",
                self.max_calls
            ));
        }

        debug!(tool = %call.name, used, "executing tool");
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}
