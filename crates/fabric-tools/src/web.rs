//! Web tools: `web_search` and `fetch_url`.
//!
//! Offered by the research pack only when the task allows network access.
//! Search goes through a configurable endpoint and degrades gracefully
//! when none is set; fetch is a plain GET with a text cap.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use fabric_core::tools::{Tool, ToolError};

/// Cap on extracted page text returned to the model.
const FETCH_TEXT_CAP: usize = 200_000;

/// Default number of search results.
const DEFAULT_SEARCH_RESULTS: u64 = 8;

/// Default fetch timeout.
const DEFAULT_FETCH_TIMEOUT_S: u64 = 30;

fn utc_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Minimal query-string encoding, enough for search terms.
fn urlencode_minimal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' => out.push_str("%20"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '+' => out.push_str("%2B"),
            '#' => out.push_str("%23"),
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// web_search
// ---------------------------------------------------------------------------

/// Query a configurable search API endpoint.
pub struct WebSearchTool {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl WebSearchTool {
    /// Create a search tool. `endpoint = None` makes the tool answer with
    /// a structured "not configured" reply instead of failing.
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of results with titles, URLs, and snippets."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query string."
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default 8)."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: query".into()))?;
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SEARCH_RESULTS);

        let endpoint = match self.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => {
                return Ok(json!({
                    "query": query,
                    "results": [],
                    "warning": "web search is not configured; set search_endpoint in the config",
                }));
            }
        };

        debug!(query, max_results, "executing web search");
        let url = format!(
            "{endpoint}?q={}&limit={max_results}",
            urlencode_minimal(query)
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "search API returned status {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search read failed: {e}")))?;
        let results = serde_json::from_str::<serde_json::Value>(&body)
            .unwrap_or(serde_json::Value::String(body));
        Ok(json!({ "query": query, "results": results, "ts": utc_iso() }))
    }
}

// ---------------------------------------------------------------------------
// fetch_url
// ---------------------------------------------------------------------------

/// Fetch a URL and return its text content, capped.
pub struct FetchUrlTool {
    http: reqwest::Client,
}

impl FetchUrlTool {
    /// Create a fetch tool.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("taskfabric/0.3 (+local)")
                .redirect(reqwest::redirect::Policy::limited(5))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its text content (capped at 200000 characters)."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch."
                },
                "timeout_s": {
                    "type": "integer",
                    "description": "Request timeout in seconds (default 30)."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: url".into()))?;
        let timeout_s = args
            .get("timeout_s")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_S);

        debug!(url, timeout_s, "fetching url");
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(timeout_s))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "fetch returned status {}",
                response.status()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("fetch read failed: {e}")))?;
        let capped: String = text.chars().take(FETCH_TEXT_CAP).collect();
        Ok(json!({ "url": url, "fetched_at": utc_iso(), "text": capped }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_without_endpoint_degrades_gracefully() {
        let tool = WebSearchTool::new(None);
        let result = tool.execute(json!({"query": "rust agents"})).await.unwrap();
        assert!(result["results"].as_array().unwrap().is_empty());
        assert!(result["warning"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn search_queries_configured_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust agents"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"title": "t", "url": "u", "snippet": "s"}
            ])))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Some(format!("{}/search", server.uri())));
        let result = tool
            .execute(json!({"query": "rust agents", "max_results": 3}))
            .await
            .unwrap();
        assert_eq!(result["results"][0]["title"], "t");
        assert_eq!(result["query"], "rust agents");
    }

    #[tokio::test]
    async fn search_missing_query_is_invalid() {
        let tool = WebSearchTool::new(None);
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn search_upstream_error_is_execution_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let tool = WebSearchTool::new(Some(format!("{}/search", server.uri())));
        let err = tool.execute(json!({"query": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn fetch_returns_capped_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello page"))
            .mount(&server)
            .await;

        let tool = FetchUrlTool::new();
        let result = tool
            .execute(json!({"url": format!("{}/page", server.uri())}))
            .await
            .unwrap();
        assert_eq!(result["text"], "hello page");
        assert!(result["fetched_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn fetch_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let tool = FetchUrlTool::new();
        let err = tool
            .execute(json!({"url": format!("{}/x", server.uri())}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[test]
    fn urlencode_handles_specials() {
        assert_eq!(urlencode_minimal("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(urlencode_minimal("plain"), "plain");
    }
}
