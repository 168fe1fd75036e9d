//! Remote-tool transports.
//!
//! [`McpTransport`] abstracts the wire; [`StdioTransport`] speaks to a
//! child process over stdin/stdout with request-ID multiplexing, and
//! [`SseTransport`] POSTs JSON-RPC to an HTTP endpoint (the request side
//! of SSE-style servers).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::error::{Result, ServiceError};

/// Default timeout for waiting on one response.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Transport layer for JSON-RPC communication with a remote tool server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response.
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification (no response expected).
    async fn send_notification(&self, method: &str, params: serde_json::Value) -> Result<()>;
}

/// Pending response registry: request id -> oneshot sender.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Transport over a child process's stdin/stdout.
///
/// A background reader task dispatches response lines to the matching
/// pending request, so concurrent requests multiplex cleanly.
pub struct StdioTransport {
    #[allow(dead_code)]
    child: Arc<Mutex<Child>>,
    stdin: Arc<Mutex<tokio::process::ChildStdin>>,
    pending: PendingMap,
    #[allow(dead_code)]
    reader_handle: Arc<tokio::task::JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn the server process and wire up the reader task.
    pub async fn new(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null());

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ServiceError::McpTransport("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::McpTransport("failed to capture stdout".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = Arc::clone(&pending);
        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("stdio reader: server closed stdout");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(response) => {
                                let id = response.id;
                                let mut map = reader_pending.lock().await;
                                if let Some(tx) = map.remove(&id) {
                                    let _ = tx.send(response);
                                } else {
                                    warn!(id, "stdio reader: response with no pending request");
                                }
                            }
                            Err(e) => {
                                // Server-side notification or noise; skip.
                                debug!(error = %e, "stdio reader: ignoring non-response line");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdio reader: read error, exiting");
                        break;
                    }
                }
            }
            reader_pending.lock().await.clear();
        });

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            stdin: Arc::new(Mutex::new(stdin)),
            pending,
            reader_handle: Arc::new(reader_handle),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let id = request.id;
        debug!(method = %request.method, id, "sending stdio request");

        let (tx, rx) = oneshot::channel::<JsonRpcResponse>();
        {
            let mut map = self.pending.lock().await;
            map.insert(id, tx);
        }

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ServiceError::McpTransport(format!("write failed: {e}")))?;
            stdin
                .flush()
                .await
                .map_err(|e| ServiceError::McpTransport(format!("flush failed: {e}")))?;
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ServiceError::McpTransport(
                "server closed stdout before responding".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ServiceError::McpTransport(format!(
                    "request {id} timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                )))
            }
        }
    }

    async fn send_notification(&self, method: &str, params: serde_json::Value) -> Result<()> {
        let notif = JsonRpcNotification::new(method, params);
        let mut line = serde_json::to_string(&notif)?;
        line.push('\n');

        debug!(method = %method, "sending stdio notification");

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ServiceError::McpTransport(format!("notification write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ServiceError::McpTransport(format!("notification flush failed: {e}")))?;
        Ok(())
    }
}

/// Transport that POSTs JSON-RPC to an HTTP endpoint, with per-server
/// extra headers. The request side of SSE-style remote tool servers.
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl SseTransport {
    /// Create a transport targeting `endpoint` with extra headers.
    pub fn new(endpoint: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            headers,
        }
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        debug!(
            method = %request.method,
            id = request.id,
            endpoint = %self.endpoint,
            "sending http request"
        );

        let req = self.apply_headers(self.client.post(&self.endpoint).json(&request));
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::McpTransport(format!("http request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::McpTransport(format!("HTTP {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| ServiceError::McpTransport(format!("failed to parse response: {e}")))
    }

    async fn send_notification(&self, method: &str, params: serde_json::Value) -> Result<()> {
        let notif = JsonRpcNotification::new(method, params);
        let req = self.apply_headers(self.client.post(&self.endpoint).json(&notif));
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::McpTransport(format!("http notification failed: {e}")))?;

        // Notifications are fire-and-forget; log but do not fail.
        if !resp.status().is_success() {
            debug!(method = %method, status = %resp.status(), "notification non-success status");
        }
        Ok(())
    }
}

/// A mock transport for tests: returns pre-programmed responses in order
/// and records everything sent.
#[cfg(test)]
pub struct MockTransport {
    responses: Arc<Mutex<Vec<JsonRpcResponse>>>,
    requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
    notifications: Arc<Mutex<Vec<JsonRpcNotification>>>,
}

#[cfg(test)]
impl MockTransport {
    /// Create a mock with pre-programmed responses.
    pub fn new(responses: Vec<JsonRpcResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All requests sent through this transport.
    pub async fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().await.clone()
    }

    /// All notifications sent through this transport.
    pub async fn notifications(&self) -> Vec<JsonRpcNotification> {
        self.notifications.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl McpTransport for MockTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.requests.lock().await.push(request);
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Err(ServiceError::McpTransport("no more mock responses".into()))
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn send_notification(&self, method: &str, params: serde_json::Value) -> Result<()> {
        self.notifications
            .lock()
            .await
            .push(JsonRpcNotification::new(method, params));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdio_transport_round_trips_with_cat_like_server() {
        // A minimal JSON-RPC echo server in bash: reads one line, answers
        // a fixed response with the same id.
        let script = r#"read line; id=$(echo "$line" | sed 's/.*"id":\([0-9]*\).*/\1/'); echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"ok\":true}}""#;
        let transport = StdioTransport::new(
            "bash",
            &["-c".to_string(), script.to_string()],
            &HashMap::new(),
        )
        .await
        .unwrap();

        let response = transport
            .send_request(JsonRpcRequest::new(42, "ping", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.id, 42);
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn stdio_transport_spawn_failure_is_io_error() {
        let result = StdioTransport::new(
            "definitely-not-a-real-binary-xyz",
            &[],
            &HashMap::new(),
        )
        .await;
        let err = match result {
            Err(e) => e,
            Ok(_) => panic!("expected StdioTransport::new to fail"),
        };
        assert!(matches!(err, ServiceError::Io(_)));
    }

    #[tokio::test]
    async fn stdio_transport_closed_stdout_fails_cleanly() {
        let transport = StdioTransport::new(
            "bash",
            &["-c".to_string(), "exit 0".to_string()],
            &HashMap::new(),
        )
        .await
        .unwrap();
        // Give the child a moment to exit.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let err = transport
            .send_request(JsonRpcRequest::new(1, "ping", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::McpTransport(_)));
    }

    #[tokio::test]
    async fn mock_transport_records_traffic() {
        let mock = MockTransport::new(vec![JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: Some(serde_json::json!({})),
            error: None,
        }]);
        mock.send_request(JsonRpcRequest::new(1, "tools/list", serde_json::json!({})))
            .await
            .unwrap();
        mock.send_notification("notifications/initialized", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(mock.requests().await.len(), 1);
        assert_eq!(mock.notifications().await.len(), 1);
    }
}
