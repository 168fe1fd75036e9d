//! The specialist-pack seam.
//!
//! A pack bundles a system prompt, tool definitions, tool execution, and
//! finish-payload validation. The pack abstraction is a capability set,
//! not a class hierarchy: concrete packs live in `fabric-tools`, the
//! remote-tool augmentation decorator in `fabric-services`, and the engine
//! only ever sees `dyn SpecialistPack`.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::tools::ToolError;

/// The distinguished tool whose successful call terminates the loop.
pub const FINISH_TOOL_NAME: &str = "finish_task";

/// A specialist pack: system prompt, tools, execution, finish validation.
#[async_trait]
pub trait SpecialistPack: Send + Sync {
    /// Stable pack id ("engineering", "research", ...).
    fn specialist_id(&self) -> &str;

    /// The system prompt describing the pack's role, tools, and the
    /// required shape of the finish payload.
    fn system_prompt(&self) -> &str;

    /// Ordered tool definitions in the OpenAI function-tool schema,
    /// including the finish tool.
    fn tool_definitions(&self) -> Vec<serde_json::Value>;

    /// Name of the finish tool.
    fn finish_tool_name(&self) -> &str {
        FINISH_TOOL_NAME
    }

    /// Ordered argument names the finish payload must carry.
    fn finish_required_fields(&self) -> Vec<String>;

    /// Execute a (non-finish) tool by name.
    async fn execute_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;

    /// Pack-specific quality gate over the finish arguments.
    ///
    /// Returns an error string to feed back to the model, or `None` when
    /// the payload passes. Must be idempotent: validating the same value
    /// twice gives the same answer.
    fn validate_finish_payload(&self, args: &serde_json::Value) -> Option<String>;

    /// Scoped lifecycle hook run before the loop starts.
    async fn open(&mut self) -> fabric_types::Result<()> {
        Ok(())
    }

    /// Scoped lifecycle hook run after the loop ends, success or not.
    async fn close(&mut self) -> fabric_types::Result<()> {
        Ok(())
    }
}

/// Resolve a specialist pack by id.
///
/// The config-backed implementation lives in `fabric-tools`; the
/// remote-tool augmenting decorator in `fabric-services` wraps any inner
/// registry.
pub trait SpecialistRegistry: Send + Sync {
    /// Build the pack for `specialist_id`, sandboxed to `workspace_path`.
    ///
    /// `network_allowed = false` must omit network-touching tools from the
    /// pack's definitions entirely.
    fn get_pack(
        &self,
        specialist_id: &str,
        workspace_path: &Path,
        network_allowed: bool,
    ) -> fabric_types::Result<Box<dyn SpecialistPack>>;

    /// All registered pack ids, in configuration order.
    fn list_ids(&self) -> Vec<String>;
}

/// Build an OpenAI function-tool definition.
pub fn tool_def(
    name: &str,
    description: &str,
    parameters: serde_json::Value,
) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

/// Build a `finish_task` tool definition from property schemas and the
/// required field list.
pub fn finish_tool_def(
    description: &str,
    properties: serde_json::Value,
    required: &[&str],
) -> serde_json::Value {
    tool_def(
        FINISH_TOOL_NAME,
        description,
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_def_shape() {
        let def = tool_def(
            "read_file",
            "Read a file.",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        );
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "read_file");
        assert_eq!(def["function"]["description"], "Read a file.");
        assert!(def["function"]["parameters"]["properties"]["path"].is_object());
    }

    #[test]
    fn finish_tool_def_carries_required_list() {
        let def = finish_tool_def(
            "Call when done.",
            json!({"summary": {"type": "string"}}),
            &["summary"],
        );
        assert_eq!(def["function"]["name"], FINISH_TOOL_NAME);
        assert_eq!(def["function"]["parameters"]["required"][0], "summary");
    }
}
