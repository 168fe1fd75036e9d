//! Shell tools: `shell` and `run_tests`.
//!
//! Both execute through [`run_cmd`](crate::sandbox::run_cmd), so the
//! allowlist, the cwd gate, the timeout, and the output caps apply
//! uniformly. `run_tests` is a separate tool name so the engineering
//! pack's `tests_verified` quality gate has a verifiable counterpart in
//! the run log.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fabric_core::tools::{Tool, ToolError};
use fabric_types::constants::SHELL_DEFAULT_TIMEOUT_S;

use crate::sandbox::{run_cmd, SandboxPolicy};

fn argv_from(args: &serde_json::Value) -> Result<Vec<String>, ToolError> {
    let cmd = args
        .get("cmd")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::InvalidArgs("missing required field: cmd (string array)".into()))?;
    cmd.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| ToolError::InvalidArgs("cmd must be an array of strings".into()))
        })
        .collect()
}

fn timeout_from(args: &serde_json::Value) -> u64 {
    args.get("timeout_s")
        .and_then(|v| v.as_u64())
        .unwrap_or(SHELL_DEFAULT_TIMEOUT_S)
}

fn cmd_parameters() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "cmd": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Command and arguments as an argv array, e.g. [\"python\", \"app.py\"]."
            },
            "timeout_s": {
                "type": "integer",
                "description": "Wall-clock timeout in seconds (default 120)."
            }
        },
        "required": ["cmd"]
    })
}

/// Run an allowlisted command in the workspace.
pub struct ShellTool {
    policy: Arc<SandboxPolicy>,
}

impl ShellTool {
    /// Create a shell tool over the given sandbox policy.
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run an allowlisted command in the workspace and return its exit code, stdout, and stderr."
    }

    fn parameters(&self) -> serde_json::Value {
        cmd_parameters()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let argv = argv_from(&args)?;
        run_cmd(&self.policy, &argv, None, timeout_from(&args)).await
    }
}

/// Run the project's tests (or any verification command) in the workspace.
pub struct RunTestsTool {
    policy: Arc<SandboxPolicy>,
}

impl RunTestsTool {
    /// Create a run-tests tool over the given sandbox policy.
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &str {
        "run_tests"
    }

    fn description(&self) -> &str {
        "Run the test or verification command for the work in the workspace \
         (e.g. [\"pytest\"] or [\"python\", \"hello.py\"]). Call this before \
         setting tests_verified=true in finish_task."
    }

    fn parameters(&self) -> serde_json::Value {
        cmd_parameters()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let argv = argv_from(&args)?;
        run_cmd(&self.policy, &argv, None, timeout_from(&args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Arc<SandboxPolicy>) {
        let dir = tempfile::tempdir().unwrap();
        let policy = Arc::new(SandboxPolicy::new(dir.path()));
        (dir, policy)
    }

    #[tokio::test]
    async fn shell_runs_argv() {
        let (_dir, policy) = setup();
        let tool = ShellTool::new(policy);
        let result = tool
            .execute(json!({"cmd": ["echo", "ok"]}))
            .await
            .unwrap();
        assert_eq!(result["returncode"], 0);
        assert_eq!(result["stdout"].as_str().unwrap().trim(), "ok");
    }

    #[tokio::test]
    async fn shell_rejects_non_array_cmd() {
        let (_dir, policy) = setup();
        let tool = ShellTool::new(policy);
        let err = tool.execute(json!({"cmd": "echo ok"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn shell_rejects_non_string_elements() {
        let (_dir, policy) = setup();
        let tool = ShellTool::new(policy);
        let err = tool.execute(json!({"cmd": ["echo", 42]})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn shell_enforces_allowlist() {
        let (_dir, policy) = setup();
        let tool = ShellTool::new(policy);
        let err = tool
            .execute(json!({"cmd": ["wget", "http://example.com"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn shell_timeout_override() {
        let (_dir, policy) = setup();
        let tool = ShellTool::new(policy);
        let err = tool
            .execute(json!({"cmd": ["bash", "-c", "sleep 30"], "timeout_s": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)));
    }

    #[tokio::test]
    async fn run_tests_shares_the_gate() {
        let (_dir, policy) = setup();
        let tool = RunTestsTool::new(policy);
        let result = tool
            .execute(json!({"cmd": ["bash", "-c", "exit 1"]}))
            .await
            .unwrap();
        // A failing test run is a result, not a tool error.
        assert_eq!(result["returncode"], 1);
    }
}
