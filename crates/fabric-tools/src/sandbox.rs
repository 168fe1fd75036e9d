//! Sandbox policy, path safety, and the command gate.
//!
//! Every filesystem tool resolves paths through [`safe_path`] and every
//! shell tool executes through [`run_cmd`]. Containment is enforced twice:
//! lexically (`..` components may never climb above the root) and
//! physically (the deepest existing ancestor is canonicalised, so a
//! symlink pointing outside the workspace is caught).

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use fabric_core::tools::ToolError;
use fabric_types::constants::MAX_TOOL_OUTPUT_CHARS;

/// Environment variable announcing the sandbox root to child processes.
pub const SANDBOX_ROOT_ENV: &str = "FABRIC_SANDBOX_ROOT";

/// Commands the shell tools may execute.
pub fn default_allowed_commands() -> BTreeSet<String> {
    [
        "python", "python3", "pytest", "bash", "sh", "git", "rg", "ls", "cat", "sed", "awk",
        "jq", "pip", "uv", "make", "cargo", "echo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Path-safety and command-allowlist policy for one run's workspace.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// The workspace root. Everything the tools touch stays under it.
    pub root: PathBuf,

    /// Executables `run_cmd` may spawn.
    pub allowed_commands: BTreeSet<String>,

    /// Whether network-touching tools are offered at all.
    pub network_allowed: bool,

    /// Per-stream output cap for captured stdout/stderr.
    pub max_output_chars: usize,
}

impl SandboxPolicy {
    /// Create a policy rooted at `root` with the default allowlist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_commands: default_allowed_commands(),
            network_allowed: true,
            max_output_chars: MAX_TOOL_OUTPUT_CHARS,
        }
    }
}

/// Resolve `rel_path` against the policy root, enforcing containment.
///
/// Rejects absolute paths outright, rejects `..` components that climb
/// above the root, and canonicalises the deepest existing ancestor so a
/// symlink cannot smuggle the path outside. The returned path may not
/// exist yet (write tools create it).
pub fn safe_path(policy: &SandboxPolicy, rel_path: &str) -> Result<PathBuf, ToolError> {
    let rel = Path::new(rel_path);
    if rel.is_absolute() || rel_path.starts_with('/') {
        return Err(ToolError::PermissionDenied(format!(
            "path must be relative (e.g. 'app.py' or 'src/app.py'), got: {rel_path:?}"
        )));
    }

    // Lexical pass: normalise `.` and `..` without touching the fs.
    let mut depth: Vec<std::ffi::OsString> = Vec::new();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => depth.push(name.to_os_string()),
            Component::ParentDir => {
                if depth.pop().is_none() {
                    return Err(ToolError::PermissionDenied(format!(
                        "path {rel_path:?} resolves outside the workspace sandbox; \
                         use a relative path that stays within the workspace"
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::PermissionDenied(format!(
                    "path must be relative, got: {rel_path:?}"
                )));
            }
        }
    }

    let root = policy.root.canonicalize().map_err(|e| {
        ToolError::ExecutionFailed(format!(
            "sandbox root {} unavailable: {e}",
            policy.root.display()
        ))
    })?;
    let mut joined = root.clone();
    for name in &depth {
        joined.push(name);
    }

    // Physical pass: canonicalise the deepest existing ancestor to defeat
    // symlink escapes, then re-attach the not-yet-existing tail.
    let resolved = resolve_existing_prefix(&joined).map_err(|_| {
        ToolError::PermissionDenied(format!(
            "path {rel_path:?} resolves outside the workspace sandbox"
        ))
    })?;
    if resolved != root && !resolved.starts_with(&root) {
        return Err(ToolError::PermissionDenied(format!(
            "path {rel_path:?} resolves outside the workspace sandbox; \
             use a relative path that stays within the workspace"
        )));
    }
    Ok(resolved)
}

fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut ancestor = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !ancestor.exists() {
        match (ancestor.parent(), ancestor.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                ancestor = parent.to_path_buf();
            }
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no existing ancestor",
                ));
            }
        }
    }
    let mut resolved = ancestor.canonicalize()?;
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Quote one argv element for the human-readable `cmd` field.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Cap a captured stream at `limit` characters, appending a marker naming
/// how much was dropped.
fn truncate_output(s: &str, limit: usize) -> String {
    let total = s.chars().count();
    if total <= limit {
        return s.to_string();
    }
    let kept: String = s.chars().take(limit).collect();
    format!("{kept}\n... [truncated {} chars]", total - limit)
}

/// Execute `argv` inside the sandbox.
///
/// Gates: non-empty argv, `argv[0]` in the allowlist, working directory
/// inside the root. The child gets [`SANDBOX_ROOT_ENV`] set, a wall-clock
/// timeout (killed on expiry), and both output streams are captured and
/// truncated independently.
pub async fn run_cmd(
    policy: &SandboxPolicy,
    argv: &[String],
    cwd: Option<&Path>,
    timeout_s: u64,
) -> Result<serde_json::Value, ToolError> {
    if argv.is_empty() {
        return Err(ToolError::InvalidArgs("empty command".into()));
    }
    let exe = &argv[0];
    if !policy.allowed_commands.contains(exe) {
        let mut allowed: Vec<&str> = policy.allowed_commands.iter().map(|s| s.as_str()).collect();
        allowed.sort_unstable();
        return Err(ToolError::PermissionDenied(format!(
            "command not allowed: {exe}; allowed: {}",
            allowed.join(", ")
        )));
    }

    let root = policy.root.canonicalize().map_err(|e| {
        ToolError::ExecutionFailed(format!(
            "sandbox root {} unavailable: {e}",
            policy.root.display()
        ))
    })?;
    let workdir = match cwd {
        None => root.clone(),
        Some(dir) => {
            let dir = dir.canonicalize().map_err(|_| {
                ToolError::PermissionDenied("cwd must be within sandbox root".into())
            })?;
            if dir != root && !dir.starts_with(&root) {
                return Err(ToolError::PermissionDenied(
                    "cwd must be within sandbox root".into(),
                ));
            }
            dir
        }
    };

    debug!(cmd = ?argv, cwd = %workdir.display(), timeout_s, "running sandboxed command");

    let mut child = tokio::process::Command::new(exe)
        .args(&argv[1..])
        .current_dir(&workdir)
        .env(SANDBOX_ROOT_ENV, &root)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed(format!("failed to spawn {exe}: {e}")))?;

    // Take the handles before awaiting so the child can still be killed
    // on timeout.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let status = match tokio::time::timeout(Duration::from_secs(timeout_s), child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(ToolError::ExecutionFailed(format!("process error: {e}")));
        }
        Err(_) => {
            let _ = child.kill().await;
            warn!(cmd = ?argv, timeout_s, "sandboxed command timed out");
            return Err(ToolError::Timeout(timeout_s));
        }
    };

    let stdout = read_stream(stdout_handle).await;
    let stderr = read_stream(stderr_handle).await;

    Ok(json!({
        "cmd": argv.iter().map(|a| quote_arg(a)).collect::<Vec<_>>().join(" "),
        "returncode": status.code().unwrap_or(-1),
        "stdout": truncate_output(&stdout, policy.max_output_chars),
        "stderr": truncate_output(&stderr, policy.max_output_chars),
    }))
}

async fn read_stream(handle: Option<impl AsyncReadExt + Unpin>) -> String {
    match handle {
        None => String::new(),
        Some(mut handle) => {
            let mut buf = Vec::new();
            let _ = handle.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}
