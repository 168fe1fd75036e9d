//! Lenient OpenAI-compatible chat client for local servers.
//!
//! The default backend. Adds two workarounds on top of the bare client:
//!
//! - A 400 whose error body names "does not support tools" becomes the
//!   fatal [`ProviderError::ModelLacksTools`].
//! - Any other 400 is retried once with a minimal payload (model, messages,
//!   stream, tools), accommodating servers that reject unknown top-level
//!   fields such as `temperature`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::ChatClient;
use crate::error::{map_send_error, ProviderError, Result};
use crate::openai_compat::status_error;
use crate::types::{extract_error_message, parse_response, ChatRequest, LlmResponse};

/// OpenAI-compatible client with local-server workarounds.
pub struct LenientChatClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl LenientChatClient {
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

/// Whether a 400 error body is the "model cannot call tools" refusal.
fn names_tools_unsupported(error_message: &str) -> bool {
    error_message.to_lowercase().contains("does not support tools")
}

#[async_trait]
impl ChatClient for LenientChatClient {
    fn name(&self) -> &str {
        "lenient"
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

        if status.as_u16() != 400 {
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status.as_u16(), &request.model, body));
            }
            let text = response.text().await.map_err(map_send_error)?;
            return parse_response(&text);
        }

        // Inspect the 400 body before deciding how to proceed.
        let error_body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&error_body);
        if names_tools_unsupported(&message) {
            return Err(ProviderError::ModelLacksTools(request.model.clone()));
        }

        // Some servers 400 on unknown top-level params; retry with a
        // minimal payload that still includes tools.
        warn!(
            model = %request.model,
            detail = %truncate(&message, 200),
            "400 from server, retrying with minimal payload"
        );
        let retry = self.post_completions(&request.minimal_payload()).await?;
        let retry_status = retry.status();
        if retry_status.as_u16() == 400 {
            let retry_body = retry.text().await.unwrap_or_default();
            let retry_message = extract_error_message(&retry_body);
            if names_tools_unsupported(&retry_message) {
                return Err(ProviderError::ModelLacksTools(request.model.clone()));
            }
            return Err(ProviderError::BadStatus {
                status: 400,
                body: retry_message,
            });
        }
        if !retry_status.is_success() {
            let retry_body = retry.text().await.unwrap_or_default();
            return Err(status_error(retry_status.as_u16(), &request.model, retry_body));
        }
        let text = retry.text().await.map_err(map_send_error)?;
        parse_response(&text)
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl std::fmt::Debug for LenientChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LenientChatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}
