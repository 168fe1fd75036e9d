//! Bare OpenAI-compatible chat client.
//!
//! Works with any backend exposing `POST {base_url}/chat/completions` in
//! the standard format: cloud providers, vLLM, LM Studio, and others. No
//! backend-specific workarounds; any non-2xx response is an error without
//! retrying. For local servers with quirks, use
//! [`LenientChatClient`](crate::lenient::LenientChatClient).

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::client::ChatClient;
use crate::error::{map_send_error, ProviderError, Result};
use crate::types::{parse_response, ChatRequest, LlmResponse};

/// Bare OpenAI-compatible chat client (no backend-specific workarounds).
pub struct GenericChatClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl GenericChatClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_s: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post_completions(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let mut req = self
            .http
            .post(self.completions_url())
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        req.json(body).send().await.map_err(map_send_error)
    }
}

#[async_trait]
impl ChatClient for GenericChatClient {
    fn name(&self) -> &str {
        "generic"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        debug!(
            url = %self.completions_url(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion request"
        );

        let body = serde_json::to_value(request)?;
        let response = self.post_completions(&body).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &request.model, body));
        }

        let text = response.text().await.map_err(map_send_error)?;
        parse_response(&text)
    }
}

/// Map a non-success status onto the structured variants the task layer
/// triages on. Shared with the lenient client.
pub(crate) fn status_error(status: u16, model: &str, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthFailed(body),
        404 => ProviderError::ModelNotFound(format!("model '{model}': {body}")),
        _ => ProviderError::BadStatus { status, body },
    }
}

impl std::fmt::Debug for GenericChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericChatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}
