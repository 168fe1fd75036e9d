//! Transport-level error types for chat clients.

use thiserror::Error;

/// Errors that can occur when talking to an LLM backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The model does not support function calling. Fatal for the task.
    #[error(
        "model '{0}' does not support tool calling; use a tool-capable model \
         such as llama3.1:8b, mistral-small3.2:24b, or qwen2.5-coder:32b"
    )]
    ModelLacksTools(String),

    /// The request timed out.
    #[error("llm request timed out")]
    Timeout,

    /// The server could not be reached at all.
    #[error("llm server unreachable: {0}")]
    Unreachable(String),

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested model does not exist on the server (HTTP 404).
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Any other non-success HTTP status.
    #[error("llm server returned HTTP {status}: {body}")]
    BadStatus {
        /// The HTTP status code.
        status: u16,
        /// The (possibly truncated) response body.
        body: String,
    },

    /// The backend is not usable as configured.
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An HTTP-level error from reqwest not covered above.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required feature is disabled for the current profile.
    #[error(transparent)]
    FeatureDisabled(#[from] fabric_types::FeatureDisabledError),
}

/// Convenience alias for chat-client operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Map a reqwest send error onto the structured variants the task layer
/// triages on.
pub(crate) fn map_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_connect() {
        ProviderError::Unreachable(err.to_string())
    } else {
        ProviderError::Http(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_model_lacks_tools() {
        let err = ProviderError::ModelLacksTools("llama2:7b".into());
        assert!(err.to_string().contains("llama2:7b"));
        assert!(err.to_string().contains("does not support tool calling"));
    }

    #[test]
    fn display_bad_status() {
        let err = ProviderError::BadStatus {
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(err.to_string(), "llm server returned HTTP 500: oops");
    }

    #[test]
    fn from_feature_disabled() {
        let inner = fabric_types::FeatureSet::from_profile(
            fabric_types::ProfileTier::Nano,
            &Default::default(),
        )
        .require(fabric_types::Feature::Mcp, "enable mcp")
        .unwrap_err();
        let err: ProviderError = inner.into();
        assert!(err.to_string().contains("mcp"));
    }
}
