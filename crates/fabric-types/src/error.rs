//! Error types for the taskfabric runtime.
//!
//! [`FabricError`] covers domain-level failures. Transport-level LLM
//! failures live in `fabric-llm` and are wrapped at the task boundary.

use thiserror::Error;

/// Top-level domain error.
///
/// Variants that are reported back to the model (sandbox and tool
/// failures) are distinct from fatal ones (config, unknown specialist)
/// so callers can tell which end a run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FabricError {
    /// The sandbox rejected a path or command.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A tool ran and failed.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// No specialist pack is registered under the requested id.
    #[error("unknown specialist: {0}")]
    UnknownSpecialist(String),

    /// The requested model key has no entry in the configuration.
    #[error("unknown model key: {0}")]
    UnknownModelKey(String),

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A feature required by the current code path is disabled.
    #[error(transparent)]
    FeatureDisabled(#[from] crate::features::FeatureDisabledError),
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FabricError>;
