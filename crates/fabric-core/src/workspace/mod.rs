//! Run repository: per-run directories and the append-only run log.
//!
//! Each run owns `<workspace_root>/runs/<run_id>/` with a `workspace/`
//! sandbox directory and a `runlog.jsonl` event log. The log is
//! append-only and never rewritten; a crash can leave a truncated final
//! line, which [`reader`] tolerates.

pub mod reader;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fabric_types::{FabricError, Result, RunId};

/// Enumerated run-log event kinds. These strings are a stable external
/// interface; log readers match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Which specialist was chosen and how.
    Recruitment,
    /// The task prompt and model at loop start.
    Prompt,
    /// One LLM response (content capped, tool-call names).
    LlmResponse,
    /// One dispatched tool call.
    ToolCall,
    /// The result (or error) of one tool call.
    ToolResult,
    /// The validated finish payload. At most one per run.
    Finish,
    /// A failure or synthetic termination reason.
    Error,
    /// A cloud-fallback decision drained from the chat client.
    CloudFallback,
}

impl EventKind {
    /// The wire string written to `runlog.jsonl`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recruitment => "recruitment",
            Self::Prompt => "prompt",
            Self::LlmResponse => "llm_response",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Finish => "finish",
            Self::Error => "error",
            Self::CloudFallback => "cloud_fallback",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a freshly created run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    /// The run identifier.
    pub run_id: RunId,
    /// `<workspace_root>/runs/<run_id>`.
    pub run_dir: PathBuf,
    /// `<workspace_root>/runs/<run_id>/workspace` -- the sandbox root.
    pub workspace_path: PathBuf,
}

/// Create runs and append run-log events.
///
/// The engine is the sole writer for a run; readers open the log
/// read-only out of the hot path.
pub trait RunRepository: Send + Sync {
    /// Create a new run directory tree and return its handle.
    fn create_run(&self) -> Result<RunHandle>;

    /// Append one event line to the run's log.
    fn append_event(
        &self,
        run_id: &RunId,
        kind: EventKind,
        step: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Filesystem-backed run repository.
#[derive(Debug, Clone)]
pub struct FsRunRepository {
    workspace_root: PathBuf,
}

impl FsRunRepository {
    /// Create a repository rooted at `workspace_root` (e.g. `.taskfabric`).
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// The repository's workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.workspace_root.join("runs").join(run_id.value())
    }
}

impl RunRepository for FsRunRepository {
    fn create_run(&self) -> Result<RunHandle> {
        let run_id = RunId::generate();
        let run_dir = self.run_dir(&run_id);
        let workspace_path = run_dir.join("workspace");
        std::fs::create_dir_all(&workspace_path)?;
        Ok(RunHandle {
            run_id,
            run_dir,
            workspace_path,
        })
    }

    fn append_event(
        &self,
        run_id: &RunId,
        kind: EventKind,
        step: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let run_dir = self.run_dir(run_id);
        std::fs::create_dir_all(&run_dir)?;
        append_event_line(&run_dir, kind, step, payload)
    }
}

/// Append one UTF-8 JSON line to `<run_dir>/runlog.jsonl`.
///
/// The record is a single line (serde_json never emits raw newlines) with
/// non-ASCII preserved. The file is opened in append mode and closed per
/// call, so a crash between calls never corrupts earlier lines.
pub fn append_event_line(
    run_dir: &Path,
    kind: EventKind,
    step: Option<&str>,
    payload: serde_json::Value,
) -> Result<()> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let record = serde_json::json!({
        "ts": ts,
        "kind": kind.as_str(),
        "step": step,
        "payload": payload,
    });
    let line = serde_json::to_string(&record).map_err(FabricError::from)?;

    let log_path = run_dir.join("runlog.jsonl");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
