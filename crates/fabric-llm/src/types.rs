//! Request and response types for chat completion calls.
//!
//! These mirror the OpenAI chat-completions format, which every supported
//! backend speaks. The wire-level response is parsed into the domain
//! [`LlmResponse`], in which tool-call arguments are already decoded JSON
//! (with the `{"_raw": ...}` sentinel for undecodable argument strings).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProviderError, Result};

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// "system", "user", "assistant", or "tool".
    pub role: String,

    /// The message content. Empty for assistant messages that only carry
    /// tool calls.
    pub content: String,

    /// For tool-result messages, the ID of the tool call this answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant in this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    /// Create a message with role and content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// A tool call as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,

    /// Always "function".
    #[serde(rename = "type")]
    pub call_type: String,

    /// The function to invoke.
    pub function: FunctionCall,
}

/// A function invocation within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// The function name.
    pub name: String,

    /// The arguments as a JSON string.
    pub arguments: String,
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// The conversation so far.
    pub messages: Vec<ChatMessage>,

    /// Always `false`; the engine does not stream.
    pub stream: bool,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool definitions offered to the model.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
}

impl ChatRequest {
    /// Create a request with the engine's default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: Some(0.1),
            top_p: Some(0.9),
            max_tokens: Some(2048),
            tools: Vec::new(),
        }
    }

    /// Attach tool definitions.
    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        self.tools = tools;
        self
    }

    /// The minimal payload some servers require: model, messages, stream,
    /// and tools only. Used by the lenient client's 400 retry.
    pub fn minimal_payload(&self) -> serde_json::Value {
        let mut payload = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": false,
        });
        if !self.tools.is_empty() {
            payload["tools"] = serde_json::Value::Array(self.tools.clone());
        }
        payload
    }
}

/// One requested tool invocation, with arguments already decoded.
///
/// When the wire-level `function.arguments` string is not valid JSON, the
/// arguments become `{"_raw": "<original string>"}` so downstream policies
/// can detect malformed calls without losing the original text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Correlation id echoed back in the tool-result message.
    pub call_id: String,

    /// The tool name.
    pub tool_name: String,

    /// Decoded arguments object (or the `_raw` sentinel object).
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    /// Whether the arguments carry the malformed-JSON sentinel.
    pub fn has_raw_arguments(&self) -> bool {
        self.arguments.get("_raw").is_some()
    }
}

/// The parsed outcome of one chat call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmResponse {
    /// Assistant prose, if any.
    pub content: Option<String>,

    /// Requested tool calls, in wire order.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    /// Whether the response requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether the response carries neither content nor tool calls.
    pub fn is_empty(&self) -> bool {
        !self.has_tool_calls() && self.content.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}

// ── Wire-level response shape ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    #[serde(default)]
    pub message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunction>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Parse an OpenAI-format chat-completions response body into an
/// [`LlmResponse`].
///
/// Both HTTP clients share this so they stay in sync on the sentinel
/// behaviour for malformed tool-call arguments.
pub(crate) fn parse_response(body: &str) -> Result<LlmResponse> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed response body: {e}")))?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".into()))?;

    let mut tool_calls = Vec::new();
    for (i, tc) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
        let call_id = tc.id.filter(|s| !s.is_empty()).unwrap_or_else(|| format!("call_{i}"));
        let function = tc.function.unwrap_or_default();
        let name = function.name.unwrap_or_default();
        let raw_args = function.arguments.unwrap_or_else(|| "{}".into());
        let arguments = match serde_json::from_str::<serde_json::Value>(&raw_args) {
            Ok(value) => value,
            Err(_) => json!({ "_raw": raw_args }),
        };
        tool_calls.push(ToolCallRequest {
            call_id,
            tool_name: name,
            arguments,
        });
    }

    Ok(LlmResponse {
        content: choice.message.content,
        tool_calls,
    })
}

/// Extract a human-readable error string from a (likely 4xx) response body.
///
/// Understands `{"error": {"message": "..."}}` and `{"error": "..."}`;
/// falls back to the raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(err) = value.get("error") {
            if let Some(message) = err.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            if let Some(message) = err.as_str() {
                return message.to_string();
            }
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_helpers() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, "system");
        assert!(sys.tool_call_id.is_none());

        let tool = ChatMessage::tool("{\"ok\":true}", "call_1");
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn chat_message_skips_none_fields() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn tool_call_type_field_renamed() {
        let tc = ToolCall {
            id: "tc1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "shell".into(),
                arguments: "{}".into(),
            },
        };
        let json = serde_json::to_string(&tc).unwrap();
        assert!(json.contains(r#""type":"function""#));
        assert!(!json.contains("call_type"));
    }

    #[test]
    fn request_serialization_defaults() {
        let req = ChatRequest::new("qwen2.5:7b", vec![ChatMessage::user("hi")]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""stream":false"#));
        assert!(json.contains(r#""temperature":0.1"#));
        assert!(json.contains(r#""top_p":0.9"#));
        assert!(json.contains(r#""max_tokens":2048"#));
        assert!(!json.contains("tools"));
    }

    #[test]
    fn minimal_payload_drops_sampling_params() {
        let req = ChatRequest::new("m", vec![ChatMessage::user("hi")])
            .with_tools(vec![json!({"type": "function"})]);
        let minimal = req.minimal_payload();
        assert!(minimal.get("temperature").is_none());
        assert!(minimal.get("top_p").is_none());
        assert!(minimal.get("max_tokens").is_none());
        assert_eq!(minimal["stream"], json!(false));
        assert!(minimal.get("tools").is_some());
    }

    #[test]
    fn minimal_payload_omits_empty_tools() {
        let req = ChatRequest::new("m", vec![]);
        assert!(req.minimal_payload().get("tools").is_none());
    }

    #[test]
    fn parse_plain_content() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.content.as_deref(), Some("Hello!"));
        assert!(!resp.has_tool_calls());
        assert!(!resp.is_empty());
    }

    #[test]
    fn parse_tool_calls_in_order() {
        let body = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "a", "function": {"name": "write_file", "arguments": "{\"path\": \"x\"}"}},
                    {"id": "b", "function": {"name": "shell", "arguments": "{\"cmd\": [\"ls\"]}"}}
                ]
            }}]
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].tool_name, "write_file");
        assert_eq!(resp.tool_calls[1].tool_name, "shell");
        assert_eq!(resp.tool_calls[0].arguments["path"], "x");
    }

    #[test]
    fn parse_malformed_arguments_yields_raw_sentinel() {
        let body = r#"{
            "choices": [{"message": {
                "tool_calls": [
                    {"id": "a", "function": {"name": "shell", "arguments": "{not json"}}
                ]
            }}]
        }"#;
        let resp = parse_response(body).unwrap();
        assert!(resp.tool_calls[0].has_raw_arguments());
        assert_eq!(resp.tool_calls[0].arguments["_raw"], "{not json");
    }

    #[test]
    fn parse_missing_call_id_is_synthesised() {
        let body = r#"{
            "choices": [{"message": {
                "tool_calls": [{"function": {"name": "t", "arguments": "{}"}}]
            }}]
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.tool_calls[0].call_id, "call_0");
    }

    #[test]
    fn parse_no_choices_is_invalid() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn empty_response_detection() {
        let resp = LlmResponse {
            content: Some("   ".into()),
            tool_calls: vec![],
        };
        assert!(resp.is_empty());
        let resp = LlmResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                call_id: "c".into(),
                tool_name: "t".into(),
                arguments: json!({}),
            }],
        };
        assert!(!resp.is_empty());
    }

    #[test]
    fn error_message_extraction_variants() {
        assert_eq!(
            extract_error_message(r#"{"error": {"message": "model not found"}}"#),
            "model not found"
        );
        assert_eq!(extract_error_message(r#"{"error": "boom"}"#), "boom");
        assert_eq!(extract_error_message("plain text"), "plain text");
    }
}
