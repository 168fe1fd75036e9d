//! Tool trait and tool-set definition.
//!
//! Defines the interface every tool implementation satisfies and a
//! [`ToolSet`] that stores registered tools in order and dispatches by
//! name. Implementations live in the `fabric-tools` crate; this module
//! only defines the contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

/// Error type for tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The requested tool is not in the set.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The arguments provided to the tool are invalid.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The tool ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The sandbox rejected a path or command.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A file the tool needs does not exist.
    #[error("not found: {0}")]
    FileNotFound(String),

    /// The tool execution exceeded its time limit.
    #[error("timeout after {0}s")]
    Timeout(u64),
}

/// A named, schema-described, asynchronously executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool name as offered to the model.
    fn name(&self) -> &str;

    /// One-line description for the tool definition.
    fn description(&self) -> &str;

    /// JSON Schema object for the tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool with decoded JSON arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// An ordered collection of tools with name-based dispatch.
///
/// Registration order is preserved so `tool_definitions` presents tools to
/// the model in a stable, configured order.
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolSet {
    /// Create an empty tool set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with a duplicate name replaces the earlier
    /// entry's dispatch slot but keeps the original ordering position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.push(tool);
        self.by_name.insert(name, self.tools.len() - 1);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// OpenAI function-tool definitions in registration order.
    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Execute the named tool.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        match self.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}
