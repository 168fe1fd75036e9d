//! Cloud-fallback decorator.
//!
//! [`FallbackChatClient`] wraps a local and a cloud [`ChatClient`]. Each
//! call goes to the local model first; if the configured policy rejects the
//! response, the identical request is re-issued against the cloud model and
//! that answer is returned instead. Triggered fallbacks are queued as
//! [`FallbackEvent`]s for the engine to drain into the run log.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::client::{ChatClient, FallbackEvent};
use crate::error::Result;
use crate::types::{ChatRequest, LlmResponse};

/// Evaluates a local response and names the reason the cloud should take
/// over, or `None` when the local answer is acceptable.
///
/// Modes: `"no_tool_calls"`, `"malformed_args"`, `"always"`. Any other
/// mode never triggers, which makes an unknown string a safe default.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    mode: String,
}

impl FallbackPolicy {
    /// Create a policy with the given trigger mode.
    pub fn new(mode: impl Into<String>) -> Self {
        Self { mode: mode.into() }
    }

    /// The configured trigger mode.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Return the trigger reason, or `None` when the response passes.
    pub fn evaluate(&self, response: &LlmResponse) -> Option<&'static str> {
        match self.mode.as_str() {
            "no_tool_calls" => {
                if !response.has_tool_calls() {
                    return Some("no_tool_calls");
                }
            }
            "malformed_args" => {
                if response.tool_calls.iter().any(|tc| tc.has_raw_arguments()) {
                    return Some("malformed_args");
                }
            }
            "always" => return Some("always"),
            _ => {}
        }
        None
    }
}

/// Chat client that falls back to a cloud model when the local response
/// fails the quality policy.
pub struct FallbackChatClient {
    local: Arc<dyn ChatClient>,
    cloud: Arc<dyn ChatClient>,
    cloud_model: String,
    policy: FallbackPolicy,
    pending: Mutex<Vec<FallbackEvent>>,
}

impl FallbackChatClient {
    /// Wrap `local` with a cloud fallback.
    pub fn new(
        local: Arc<dyn ChatClient>,
        cloud: Arc<dyn ChatClient>,
        cloud_model: impl Into<String>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            local,
            cloud,
            cloud_model: cloud_model.into(),
            policy,
            pending: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatClient for FallbackChatClient {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let local_response = self.local.chat(request).await?;

        let reason = match self.policy.evaluate(&local_response) {
            None => return Ok(local_response),
            Some(reason) => reason,
        };

        info!(
            reason,
            local_model = %request.model,
            cloud_model = %self.cloud_model,
            "cloud fallback triggered"
        );

        let mut cloud_request = request.clone();
        cloud_request.model = self.cloud_model.clone();
        let cloud_response = self.cloud.chat(&cloud_request).await?;

        self.pending
            .lock()
            .expect("fallback event queue poisoned")
            .push(FallbackEvent {
                reason: reason.to_string(),
                local_model: request.model.clone(),
                cloud_model: self.cloud_model.clone(),
            });

        Ok(cloud_response)
    }

    fn pop_fallback_events(&self) -> Vec<FallbackEvent> {
        std::mem::take(
            &mut *self
                .pending
                .lock()
                .expect("fallback event queue poisoned"),
        )
    }
}

impl std::fmt::Debug for FallbackChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChatClient")
            .field("cloud_model", &self.cloud_model)
            .field("policy", &self.policy.mode)
            .finish_non_exhaustive()
    }
}
