//! The [`ChatClient`] trait every backend implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChatRequest, LlmResponse};

/// A record of one cloud-fallback decision, drained by the engine after
/// each chat call and written to the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    /// Why the policy triggered ("no_tool_calls", "malformed_args", ...).
    pub reason: String,
    /// The local model whose response was rejected.
    pub local_model: String,
    /// The cloud model that answered instead.
    pub cloud_model: String,
}

/// Uniform async interface to a chat-completions backend with function
/// calling.
///
/// Implementations handle the protocol details (auth, payload shape,
/// backend quirks). The engine only ever sees [`LlmResponse`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// A short name for logs ("generic", "lenient", "fallback").
    fn name(&self) -> &str;

    /// Execute one chat completion call.
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse>;

    /// Drain any pending cloud-fallback events.
    ///
    /// Non-decorated clients never produce any; the default keeps the
    /// engine unaware of which flavour it holds.
    fn pop_fallback_events(&self) -> Vec<FallbackEvent> {
        Vec::new()
    }
}
