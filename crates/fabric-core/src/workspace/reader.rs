//! Read and summarise past runs.
//!
//! Lightweight, read-only access to run directories so the `logs` CLI
//! command and the HTTP surface can list and inspect runs without touching
//! the write path. Parsing is tolerant: malformed lines (e.g. a truncated
//! final line after a crash) are skipped.

use std::path::{Path, PathBuf};

use fabric_types::{FabricError, Result};

/// Lightweight summary of a single run, built from its run log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    /// The run id (directory name).
    pub run_id: String,
    /// Absolute run directory.
    pub run_dir: PathBuf,
    /// Specialist id from the recruitment event, if present.
    pub specialist_id: Option<String>,
    /// How the specialist was chosen ("explicit" or "keyword").
    pub routing_method: Option<String>,
    /// Timestamp of the first event.
    pub first_event_ts: Option<f64>,
    /// Number of parseable events.
    pub event_count: usize,
    /// `summary` (or `executive_summary`) from the finish payload.
    pub payload_summary: Option<String>,
}

/// Parse a `runlog.jsonl` file, silently skipping malformed lines.
pub fn parse_runlog(path: &Path) -> Vec<serde_json::Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            serde_json::from_str(line).ok()
        })
        .collect()
}

fn summarise_run(run_dir: &Path) -> RunSummary {
    let events = parse_runlog(&run_dir.join("runlog.jsonl"));

    let mut specialist_id = None;
    let mut routing_method = None;
    let mut first_event_ts = None;
    let mut payload_summary = None;

    for event in &events {
        if first_event_ts.is_none() {
            first_event_ts = event.get("ts").and_then(|v| v.as_f64());
        }
        match event.get("kind").and_then(|k| k.as_str()) {
            Some("recruitment") => {
                let payload = event.get("payload");
                specialist_id = payload
                    .and_then(|p| p.get("specialist_id"))
                    .and_then(|v| v.as_str())
                    .map(String::from);
                routing_method = payload
                    .and_then(|p| p.get("routing_method"))
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
            Some("finish") => {
                let payload = event.get("payload");
                payload_summary = payload
                    .and_then(|p| p.get("summary").or_else(|| p.get("executive_summary")))
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
            _ => {}
        }
    }

    RunSummary {
        run_id: run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        run_dir: run_dir.to_path_buf(),
        specialist_id,
        routing_method,
        first_event_ts,
        event_count: events.len(),
        payload_summary,
    }
}

/// List recent runs sorted by start time, most recent first.
///
/// Scans `<workspace_root>/runs/` for directories containing a
/// `runlog.jsonl`. Returns at most `limit` entries.
pub fn list_runs(workspace_root: &Path, limit: usize) -> Vec<RunSummary> {
    let runs_dir = workspace_root.join("runs");
    let entries = match std::fs::read_dir(&runs_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut summaries: Vec<RunSummary> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join("runlog.jsonl").is_file())
        .map(|path| summarise_run(&path))
        .collect();

    // None timestamps sort last.
    summaries.sort_by(|a, b| {
        let ta = a.first_event_ts.unwrap_or(0.0);
        let tb = b.first_event_ts.unwrap_or(0.0);
        tb.partial_cmp(&ta).unwrap_or(std::cmp::Ordering::Equal)
    });
    summaries.truncate(limit);
    summaries
}

/// Return all run-log events for `run_id`.
pub fn read_run_events(run_id: &str, workspace_root: &Path) -> Result<Vec<serde_json::Value>> {
    let runlog = workspace_root.join("runs").join(run_id).join("runlog.jsonl");
    if !runlog.is_file() {
        return Err(FabricError::ConfigInvalid {
            reason: format!(
                "run '{run_id}' not found in workspace '{}'; use 'fabric logs list' to see available runs",
                workspace_root.display()
            ),
        });
    }
    Ok(parse_runlog(&runlog))
}
