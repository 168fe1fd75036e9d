//! Chat-client layer for the taskfabric runtime.
//!
//! Everything speaks the OpenAI chat-completions wire format with function
//! calling. Three client flavours exist:
//!
//! - [`GenericChatClient`] -- bare OpenAI-compatible client, no workarounds.
//! - [`LenientChatClient`] -- adds the local-server workarounds: detects the
//!   "does not support tools" 400 and retries unknown-field 400s with a
//!   minimal payload.
//! - [`FallbackChatClient`] -- decorator that re-issues a call against a
//!   cloud model when a quality policy rejects the local response.
//!
//! [`build_chat_client`] maps a [`ModelConfig`](fabric_types::ModelConfig)
//! to the right client and applies the fallback decorator.

pub mod bootstrap;
pub mod client;
pub mod error;
pub mod factory;
pub mod fallback;
pub mod lenient;
pub mod openai_compat;
pub mod types;

pub use client::{ChatClient, FallbackEvent};
pub use error::{ProviderError, Result};
pub use factory::build_chat_client;
pub use fallback::{FallbackChatClient, FallbackPolicy};
pub use lenient::LenientChatClient;
pub use openai_compat::GenericChatClient;
pub use types::{
    ChatMessage, ChatRequest, FunctionCall, LlmResponse, ToolCall, ToolCallRequest,
};
