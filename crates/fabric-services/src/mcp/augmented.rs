//! Pack augmentation: layer remote tool servers onto a specialist pack.
//!
//! Remote tool names are namespaced `remote__<server>__<tool>` so they can
//! never collide with native pack tools. The decorator forwards the pack
//! identity, prompt, and finish contract to the inner pack untouched.

use std::path::Path;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::json;
use tracing::{debug, warn};

use fabric_core::pack::{SpecialistPack, SpecialistRegistry};
use fabric_core::tools::ToolError;
use fabric_types::{FabricError, McpServerConfig, McpTransportKind};

use super::transport::{McpTransport, SseTransport, StdioTransport};
use super::{McpSession, ToolDefinition};
use crate::error::{Result, ServiceError};

/// The namespace prefix for one server's tools.
fn namespace(server_name: &str) -> String {
    format!("remote__{server_name}__")
}

/// Convert an advertised remote tool into an OpenAI function-tool
/// definition under its prefixed name.
fn to_openai_def(prefixed_name: &str, tool: &ToolDefinition) -> serde_json::Value {
    let schema = if tool.input_schema.is_object() {
        tool.input_schema.clone()
    } else {
        json!({"type": "object", "properties": {}, "required": []})
    };
    json!({
        "type": "function",
        "function": {
            "name": prefixed_name,
            "description": tool.description.as_str(),
            "parameters": schema,
        }
    })
}

/// Manages the lifecycle of one remote tool server connection.
pub struct McpSessionManager {
    config: McpServerConfig,
    session: Option<McpSession>,
}

impl McpSessionManager {
    /// Create a manager for one configured server (not yet connected).
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// The configured server name (the namespace).
    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    /// Open the transport and perform the session handshake.
    pub async fn connect(&mut self) -> Result<()> {
        let transport: Box<dyn McpTransport> = match self.config.transport {
            McpTransportKind::Stdio => Box::new(
                StdioTransport::new(&self.config.command, &self.config.args, &self.config.env)
                    .await?,
            ),
            McpTransportKind::Sse => Box::new(SseTransport::new(
                self.config.url.clone(),
                self.config.headers.clone(),
            )),
        };
        let session = McpSession::connect(transport).await?;
        debug!(
            server = %self.config.name,
            protocol = %session.protocol_version,
            "remote tool server connected"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Drop the session, terminating the server connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session = None;
        debug!(server = %self.config.name, "remote tool server disconnected");
        Ok(())
    }

    fn session(&self) -> Result<&McpSession> {
        self.session
            .as_ref()
            .ok_or_else(|| ServiceError::McpTransport(format!("{} not connected", self.config.name)))
    }

    /// OpenAI-format definitions for all tools on this server, under the
    /// `remote__<server>__` prefix.
    pub async fn list_tools(&self) -> Result<Vec<serde_json::Value>> {
        let session = self.session()?;
        let tools = session.list_tools().await?;
        let prefix = namespace(&self.config.name);
        Ok(tools
            .iter()
            .map(|tool| to_openai_def(&format!("{prefix}{}", tool.name), tool))
            .collect())
    }

    /// Whether `name` belongs to this server's namespace.
    pub fn owns_tool(&self, name: &str) -> bool {
        name.starts_with(&namespace(&self.config.name))
    }

    /// Call a prefixed tool, flattening the protocol result into
    /// `{"result": text}` or `{"error": text}`.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let prefix = namespace(&self.config.name);
        let bare_name = name.strip_prefix(&prefix).unwrap_or(name);
        let result = self.session()?.call_tool(bare_name, args).await?;

        let text = result
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if is_error {
            warn!(
                server = %self.config.name,
                tool = bare_name,
                "remote tool returned isError"
            );
            let message = if text.is_empty() { "unknown error".to_string() } else { text };
            return Ok(json!({ "error": message }));
        }
        Ok(json!({ "result": text }))
    }
}

/// Decorator that adds remote tool servers to an existing specialist pack.
///
/// On [`open`](SpecialistPack::open) the inner pack opens first, then all
/// sessions connect concurrently and their advertised tools are merged. On
/// [`close`](SpecialistPack::close) individual session failures are logged
/// and swallowed so one broken server never prevents cleanup; the inner
/// pack always closes.
pub struct McpAugmentedPack {
    inner: Box<dyn SpecialistPack>,
    sessions: Vec<McpSessionManager>,
    remote_tool_defs: Vec<serde_json::Value>,
}

impl McpAugmentedPack {
    /// Wrap `inner` with the given session managers.
    pub fn new(inner: Box<dyn SpecialistPack>, sessions: Vec<McpSessionManager>) -> Self {
        Self {
            inner,
            sessions,
            remote_tool_defs: Vec::new(),
        }
    }
}

#[async_trait]
impl SpecialistPack for McpAugmentedPack {
    fn specialist_id(&self) -> &str {
        self.inner.specialist_id()
    }

    fn system_prompt(&self) -> &str {
        self.inner.system_prompt()
    }

    fn tool_definitions(&self) -> Vec<serde_json::Value> {
        let mut defs = self.inner.tool_definitions();
        defs.extend(self.remote_tool_defs.iter().cloned());
        defs
    }

    fn finish_tool_name(&self) -> &str {
        self.inner.finish_tool_name()
    }

    fn finish_required_fields(&self) -> Vec<String> {
        self.inner.finish_required_fields()
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        for session in &self.sessions {
            if session.owns_tool(name) {
                return session
                    .call_tool(name, args)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()));
            }
        }
        self.inner.execute_tool(name, args).await
    }

    fn validate_finish_payload(&self, args: &serde_json::Value) -> Option<String> {
        self.inner.validate_finish_payload(args)
    }

    async fn open(&mut self) -> fabric_types::Result<()> {
        self.inner.open().await?;

        try_join_all(self.sessions.iter_mut().map(|s| s.connect()))
            .await
            .map_err(|e| FabricError::ToolExecution(format!("mcp connect failed: {e}")))?;

        let mut all_tools = Vec::new();
        for session in &self.sessions {
            let tools = session
                .list_tools()
                .await
                .map_err(|e| FabricError::ToolExecution(format!("mcp list_tools failed: {e}")))?;
            all_tools.extend(tools);
        }
        debug!(
            sessions = self.sessions.len(),
            remote_tools = all_tools.len(),
            "augmented pack opened"
        );
        self.remote_tool_defs = all_tools;
        Ok(())
    }

    async fn close(&mut self) -> fabric_types::Result<()> {
        for session in &mut self.sessions {
            if let Err(e) = session.disconnect().await {
                warn!(server = %session.server_name(), error = %e, "session disconnect failed");
            }
        }
        if let Err(e) = self.inner.close().await {
            warn!(error = %e, "inner pack close failed");
        }
        Ok(())
    }
}

/// Registry decorator: wraps every pack from the inner registry with the
/// configured remote tool servers.
pub struct McpAugmentedRegistry {
    inner: Box<dyn SpecialistRegistry>,
    servers: Vec<McpServerConfig>,
}

impl McpAugmentedRegistry {
    /// Wrap `inner`, attaching `servers` to every pack it produces.
    pub fn new(inner: Box<dyn SpecialistRegistry>, servers: Vec<McpServerConfig>) -> Self {
        Self { inner, servers }
    }
}

impl SpecialistRegistry for McpAugmentedRegistry {
    fn get_pack(
        &self,
        specialist_id: &str,
        workspace_path: &Path,
        network_allowed: bool,
    ) -> fabric_types::Result<Box<dyn SpecialistPack>> {
        let inner = self
            .inner
            .get_pack(specialist_id, workspace_path, network_allowed)?;
        let sessions = self
            .servers
            .iter()
            .cloned()
            .map(McpSessionManager::new)
            .collect();
        Ok(Box::new(McpAugmentedPack::new(inner, sessions)))
    }

    fn list_ids(&self) -> Vec<String> {
        self.inner.list_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stdio_config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.into(),
            transport: McpTransportKind::Stdio,
            command: "some-mcp".into(),
            args: vec![],
            env: HashMap::new(),
            url: String::new(),
            headers: HashMap::new(),
        }
    }

    fn manager_with_session(name: &str, responses: Vec<super::super::types::JsonRpcResponse>) -> McpSessionManager {
        // Build a connected session by hand over a mock transport.
        let transport = super::super::transport::MockTransport::new(responses);
        let rt_session = futures_util::FutureExt::now_or_never(McpSession::connect(Box::new(
            transport,
        )));
        let session = match rt_session {
            Some(Ok(session)) => session,
            _ => panic!("mock session must connect synchronously"),
        };
        McpSessionManager {
            config: stdio_config(name),
            session: Some(session),
        }
    }

    fn init_response(id: u64) -> super::super::types::JsonRpcResponse {
        super::super::types::JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: Some(json!({
                "protocolVersion": "2025-06-18",
                "serverInfo": {"name": "mock", "version": "0"}
            })),
            error: None,
        }
    }

    fn success(id: u64, result: serde_json::Value) -> super::super::types::JsonRpcResponse {
        super::super::types::JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[test]
    fn namespace_prefix_shape() {
        assert_eq!(namespace("github"), "remote__github__");
    }

    #[test]
    fn owns_tool_matches_namespace_only() {
        let manager = McpSessionManager::new(stdio_config("github"));
        assert!(manager.owns_tool("remote__github__create_issue"));
        assert!(!manager.owns_tool("remote__slack__post"));
        assert!(!manager.owns_tool("write_file"));
    }

    #[test]
    fn to_openai_def_wraps_schema() {
        let tool = ToolDefinition {
            name: "create_issue".into(),
            description: "Create an issue".into(),
            input_schema: json!({"type": "object", "properties": {"title": {"type": "string"}}}),
        };
        let def = to_openai_def("remote__github__create_issue", &tool);
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "remote__github__create_issue");
        assert_eq!(def["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn to_openai_def_defaults_missing_schema() {
        let tool = ToolDefinition {
            name: "t".into(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
        };
        let def = to_openai_def("remote__s__t", &tool);
        assert_eq!(def["function"]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn list_tools_prefixes_names() {
        let manager = manager_with_session(
            "github",
            vec![
                init_response(1),
                success(
                    2,
                    json!({
                        "tools": [{
                            "name": "create_issue",
                            "description": "Create an issue",
                            "inputSchema": {"type": "object"}
                        }]
                    }),
                ),
            ],
        );
        let defs = manager.list_tools().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["function"]["name"], "remote__github__create_issue");
    }

    #[tokio::test]
    async fn call_tool_strips_prefix_and_flattens_result() {
        let manager = manager_with_session(
            "github",
            vec![
                init_response(1),
                success(
                    2,
                    json!({
                        "content": [{"type": "text", "text": "issue #12 created"}],
                        "isError": false
                    }),
                ),
            ],
        );
        let result = manager
            .call_tool("remote__github__create_issue", json!({"title": "bug"}))
            .await
            .unwrap();
        assert_eq!(result["result"], "issue #12 created");
    }

    #[tokio::test]
    async fn call_tool_surfaces_is_error() {
        let manager = manager_with_session(
            "github",
            vec![
                init_response(1),
                success(
                    2,
                    json!({
                        "content": [{"type": "text", "text": "rate limited"}],
                        "isError": true
                    }),
                ),
            ],
        );
        let result = manager
            .call_tool("remote__github__create_issue", json!({}))
            .await
            .unwrap();
        assert_eq!(result["error"], "rate limited");
    }

    #[tokio::test]
    async fn disconnected_manager_fails_cleanly() {
        let manager = McpSessionManager::new(stdio_config("github"));
        let err = manager.list_tools().await.unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }

    // -- McpAugmentedPack over a stub inner pack --

    struct StubPack;

    #[async_trait]
    impl SpecialistPack for StubPack {
        fn specialist_id(&self) -> &str {
            "engineering"
        }
        fn system_prompt(&self) -> &str {
            "stub"
        }
        fn tool_definitions(&self) -> Vec<serde_json::Value> {
            vec![fabric_core::pack::tool_def(
                "write_file",
                "Write.",
                json!({"type": "object"}),
            )]
        }
        fn finish_required_fields(&self) -> Vec<String> {
            vec!["summary".into()]
        }
        async fn execute_tool(
            &self,
            name: &str,
            _args: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(json!({"native": name}))
        }
        fn validate_finish_payload(&self, _args: &serde_json::Value) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn augmented_pack_forwards_identity() {
        let pack = McpAugmentedPack::new(Box::new(StubPack), vec![]);
        assert_eq!(pack.specialist_id(), "engineering");
        assert_eq!(pack.system_prompt(), "stub");
        assert_eq!(pack.finish_tool_name(), "finish_task");
        assert_eq!(pack.finish_required_fields(), vec!["summary"]);
    }

    #[tokio::test]
    async fn augmented_pack_concatenates_tool_defs() {
        let mut pack = McpAugmentedPack::new(Box::new(StubPack), vec![]);
        pack.remote_tool_defs = vec![json!({
            "type": "function",
            "function": {"name": "remote__github__create_issue"}
        })];
        let names: Vec<String> = pack
            .tool_definitions()
            .iter()
            .map(|d| d["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["write_file", "remote__github__create_issue"]);
    }

    #[tokio::test]
    async fn augmented_pack_routes_by_prefix() {
        let manager = manager_with_session(
            "github",
            vec![
                init_response(1),
                success(2, json!({"content": [{"type": "text", "text": "ok"}]})),
            ],
        );
        let pack = McpAugmentedPack::new(Box::new(StubPack), vec![manager]);

        // Prefixed name goes to the session.
        let remote = pack
            .execute_tool("remote__github__create_issue", json!({}))
            .await
            .unwrap();
        assert_eq!(remote["result"], "ok");

        // Native name falls through to the inner pack.
        let native = pack.execute_tool("write_file", json!({})).await.unwrap();
        assert_eq!(native["native"], "write_file");
    }

    #[tokio::test]
    async fn close_swallows_session_failures_and_closes_inner() {
        struct ClosableInner {
            closed: std::sync::Arc<std::sync::atomic::AtomicBool>,
        }
        #[async_trait]
        impl SpecialistPack for ClosableInner {
            fn specialist_id(&self) -> &str {
                "x"
            }
            fn system_prompt(&self) -> &str {
                ""
            }
            fn tool_definitions(&self) -> Vec<serde_json::Value> {
                vec![]
            }
            fn finish_required_fields(&self) -> Vec<String> {
                vec![]
            }
            async fn execute_tool(
                &self,
                _name: &str,
                _args: serde_json::Value,
            ) -> std::result::Result<serde_json::Value, ToolError> {
                Ok(json!({}))
            }
            fn validate_finish_payload(&self, _args: &serde_json::Value) -> Option<String> {
                None
            }
            async fn close(&mut self) -> fabric_types::Result<()> {
                self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }

        let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut pack = McpAugmentedPack::new(
            Box::new(ClosableInner {
                closed: closed.clone(),
            }),
            vec![McpSessionManager::new(stdio_config("a"))],
        );
        pack.close().await.unwrap();
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
