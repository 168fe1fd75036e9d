//! Remote tool provider (MCP) client.
//!
//! JSON-RPC 2.0 over pluggable transports (stdio or HTTP). The session
//! wrapper performs the `initialize` handshake; the
//! [`augmented`] module layers the resulting tools onto a specialist pack.

pub mod augmented;
pub mod transport;
pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};
use transport::McpTransport;
use types::JsonRpcRequest;

/// The protocol version negotiated during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Definition of one remote tool as advertised by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unprefixed).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema", alias = "input_schema", default)]
    pub input_schema: serde_json::Value,
}

/// Client for one remote tool server.
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    request_id: AtomicU64,
}

impl McpClient {
    /// Create a client over the given transport.
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport,
            request_id: AtomicU64::new(1),
        }
    }

    /// List all tools available on the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self.send_raw("tools/list", serde_json::json!({})).await?;
        let tools_value = result
            .get("tools")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(vec![]));
        Ok(serde_json::from_value(tools_value)?)
    }

    /// Call a tool on the server with raw (unprefixed) name.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.send_raw(
            "tools/call",
            serde_json::json!({ "name": name, "arguments": args }),
        )
        .await
    }

    /// Send a raw JSON-RPC request and return the `result` value.
    pub async fn send_raw(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let response = self.transport.send_request(request).await?;

        if let Some(err) = response.error {
            return Err(ServiceError::McpProtocol(format!(
                "code={}, message={}",
                err.code, err.message
            )));
        }
        response
            .result
            .ok_or_else(|| ServiceError::McpProtocol("empty result".into()))
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &dyn McpTransport {
        &*self.transport
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("request_id", &self.request_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A session that has completed the `initialize` handshake.
pub struct McpSession {
    client: McpClient,
    /// Server identification string, for logs.
    pub server_name: String,
    /// Protocol version negotiated with the server.
    pub protocol_version: String,
}

impl McpSession {
    /// Connect: send `initialize`, then the `initialized` notification.
    pub async fn connect(transport: Box<dyn McpTransport>) -> Result<Self> {
        let client = McpClient::new(transport);

        let init_result = client
            .send_raw(
                "initialize",
                serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "clientInfo": {
                        "name": "taskfabric",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;

        let server_name = init_result
            .get("serverInfo")
            .and_then(|i| i.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("")
            .to_string();
        let protocol_version = init_result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(MCP_PROTOCOL_VERSION)
            .to_string();

        client
            .transport()
            .send_notification("notifications/initialized", serde_json::json!({}))
            .await?;

        Ok(Self {
            client,
            server_name,
            protocol_version,
        })
    }

    /// List tools available on the connected server.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.client.list_tools().await
    }

    /// Call a tool on the connected server.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.client.call_tool(name, args).await
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("server_name", &self.server_name)
            .field("protocol_version", &self.protocol_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::transport::MockTransport;
    use super::types::JsonRpcResponse;

    fn success(id: u64, result: serde_json::Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: u64, code: i64, message: &str) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(types::JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    fn init_response(id: u64) -> JsonRpcResponse {
        success(
            id,
            serde_json::json!({
                "protocolVersion": "2025-06-18",
                "capabilities": { "tools": { "listChanged": true } },
                "serverInfo": { "name": "mock-server", "version": "0.1.0" }
            }),
        )
    }

    #[tokio::test]
    async fn list_tools_parses_definitions() {
        let transport = MockTransport::new(vec![success(
            1,
            serde_json::json!({
                "tools": [
                    {
                        "name": "echo",
                        "description": "Echoes input",
                        "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
                    },
                    {"name": "calc", "description": "Calculator", "inputSchema": {"type": "object"}}
                ]
            }),
        )]);
        let client = McpClient::new(Box::new(transport));
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[1].name, "calc");
    }

    #[tokio::test]
    async fn list_tools_missing_array_is_empty() {
        let transport = MockTransport::new(vec![success(1, serde_json::json!({}))]);
        let client = McpClient::new(Box::new(transport));
        assert!(client.list_tools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_tool_returns_result_value() {
        let transport = MockTransport::new(vec![success(
            1,
            serde_json::json!({"content": [{"type": "text", "text": "hi"}], "isError": false}),
        )]);
        let client = McpClient::new(Box::new(transport));
        let result = client
            .call_tool("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn jsonrpc_error_surfaces_as_protocol_error() {
        let transport = MockTransport::new(vec![failure(1, -32601, "method not found")]);
        let client = McpClient::new(Box::new(transport));
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ServiceError::McpProtocol(_)));
        assert!(err.to_string().contains("method not found"));
    }

    #[tokio::test]
    async fn empty_result_is_protocol_error() {
        let transport = MockTransport::new(vec![JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: None,
        }]);
        let client = McpClient::new(Box::new(transport));
        let err = client
            .call_tool("x", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::McpProtocol(_)));
    }

    #[tokio::test]
    async fn session_connect_performs_handshake() {
        let transport = MockTransport::new(vec![init_response(1)]);
        let session = McpSession::connect(Box::new(transport)).await.unwrap();
        assert_eq!(session.server_name, "mock-server");
        assert_eq!(session.protocol_version, "2025-06-18");
    }

    #[tokio::test]
    async fn session_connect_error_propagates() {
        let transport = MockTransport::new(vec![failure(1, -32600, "bad init")]);
        let result = McpSession::connect(Box::new(transport)).await;
        assert!(result.unwrap_err().to_string().contains("bad init"));
    }

    #[tokio::test]
    async fn session_defaults_on_minimal_init() {
        let transport = MockTransport::new(vec![success(1, serde_json::json!({}))]);
        let session = McpSession::connect(Box::new(transport)).await.unwrap();
        assert_eq!(session.server_name, "");
        assert_eq!(session.protocol_version, MCP_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn full_session_flow() {
        let transport = MockTransport::new(vec![
            init_response(1),
            success(
                2,
                serde_json::json!({
                    "tools": [{
                        "name": "greet",
                        "description": "Greets someone",
                        "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
                    }]
                }),
            ),
            success(
                3,
                serde_json::json!({
                    "content": [{"type": "text", "text": "Hello, Alice!"}],
                    "isError": false
                }),
            ),
        ]);
        let session = McpSession::connect(Box::new(transport)).await.unwrap();
        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        let result = session
            .call_tool("greet", serde_json::json!({"name": "Alice"}))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "Hello, Alice!");
    }

    #[test]
    fn tool_definition_accepts_both_schema_spellings() {
        let camel: ToolDefinition = serde_json::from_str(
            r#"{"name":"t","description":"d","inputSchema":{"type":"object"}}"#,
        )
        .unwrap();
        assert_eq!(camel.name, "t");
        let snake: ToolDefinition = serde_json::from_str(
            r#"{"name":"t","description":"d","input_schema":{"type":"object"}}"#,
        )
        .unwrap();
        assert_eq!(snake.input_schema["type"], "object");
    }
}
