//! Task, run identifier, and run result value types.

use std::path::PathBuf;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One unit of work handed to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// The natural-language task prompt.
    pub prompt: String,

    /// Forced specialist pack id. `None` means auto-routing.
    pub specialist_id: Option<String>,

    /// Which model profile to use (e.g. "quality", "fast").
    pub model_key: String,

    /// Whether network-touching tools may be offered to the model.
    pub network_allowed: bool,
}

/// Build a [`Task`], normalising the pack selection.
///
/// An empty or whitespace-only `pack` means auto-routing; surrounding
/// whitespace on a real pack id is stripped.
pub fn build_task(
    prompt: impl Into<String>,
    pack: Option<&str>,
    model_key: impl Into<String>,
    network_allowed: bool,
) -> Task {
    let specialist_id = pack
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    Task {
        prompt: prompt.into(),
        specialist_id,
        model_key: model_key.into(),
        network_allowed,
    }
}

/// Opaque per-run identifier shaped `YYYYMMDD-HHMMSS-<6-hex>`, UTC.
///
/// Generated once per task; used as the run directory name and as the
/// cross-log correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run id from the current UTC time plus 6 hex chars
    /// of entropy.
    pub fn generate() -> Self {
        let ts = Utc::now().format("%Y%m%d-%H%M%S");
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| {
                let idx: u32 = rng.gen_range(0..16);
                char::from_digit(idx, 16).unwrap_or('0')
            })
            .collect();
        Self(format!("{ts}-{suffix}"))
    }

    /// Wrap an existing run id string (e.g. read back from disk).
    pub fn from_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying string value.
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The terminal outcome of one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The run identifier.
    pub run_id: RunId,

    /// Which specialist pack executed the task.
    pub specialist_id: String,

    /// The run directory (holds `runlog.jsonl` and the workspace).
    pub run_dir: PathBuf,

    /// The sandbox root the task worked in.
    pub workspace_path: PathBuf,

    /// The model that drove the run.
    pub model_name: String,

    /// The validated `finish_task` arguments, or a synthetic payload with
    /// a `terminated_by` field when the run ended without one.
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl RunResult {
    /// The `terminated_by` marker, if this result is a synthetic terminator.
    pub fn terminated_by(&self) -> Option<&str> {
        self.payload.get("terminated_by").and_then(|v| v.as_str())
    }
}
