//! Ensure an LLM server is available before the first chat call.
//!
//! If the configured endpoint is unreachable and a start command is
//! configured, the command is spawned detached and the endpoint is polled
//! until it responds or the deadline passes. The runtime never stops a
//! server it started; the process is left running for subsequent runs.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ProviderError, Result};

/// URL to probe for liveness. For a base URL ending in `/v1` the server
/// root is probed instead (e.g. `http://localhost:11434/`).
fn health_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    match trimmed.strip_suffix("/v1") {
        Some(root) => format!("{root}/"),
        None => format!("{trimmed}/"),
    }
}

/// Whether the LLM server behind `base_url` responds at all.
pub async fn check_reachable(base_url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    match client.get(health_url(base_url)).send().await {
        Ok(response) => response.status().as_u16() < 500,
        Err(_) => false,
    }
}

/// Ensure the LLM at `base_url` is reachable, starting it when allowed.
///
/// Returns `Ok(true)` when the server is (or becomes) reachable,
/// `Ok(false)` when it is down and no start command was given, and an
/// error when a started server never became ready in time.
pub async fn ensure_llm_available(
    base_url: &str,
    start_cmd: &[String],
    timeout_s: u64,
) -> Result<bool> {
    if check_reachable(base_url, Duration::from_secs(5)).await {
        debug!(base_url, "llm server already reachable");
        return Ok(true);
    }
    if start_cmd.is_empty() {
        return Ok(false);
    }

    info!(base_url, cmd = ?start_cmd, "starting llm server");
    let mut command = std::process::Command::new(&start_cmd[0]);
    command
        .args(&start_cmd[1..])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .stdin(std::process::Stdio::null());
    // Detached: the child outlives this process; dropping the handle is
    // intentional.
    command.spawn().map_err(|e| {
        ProviderError::NotConfigured(format!(
            "cannot start llm server: {} ({e}); install the backend or fix start_cmd",
            start_cmd[0]
        ))
    })?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_s);
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        if check_reachable(base_url, Duration::from_secs(3)).await {
            info!(base_url, "llm server became ready");
            return Ok(true);
        }
    }
    Err(ProviderError::Unreachable(format!(
        "llm server at {base_url} did not become ready within {timeout_s}s after running {start_cmd:?}"
    )))
}
