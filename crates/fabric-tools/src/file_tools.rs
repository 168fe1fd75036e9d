//! File tools: read, write, and list the workspace.
//!
//! All paths go through [`safe_path`](crate::sandbox::safe_path); nothing
//! outside the policy root is ever touched.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use fabric_core::tools::{Tool, ToolError};

use crate::sandbox::{safe_path, SandboxPolicy};

/// Default cap for `list_files`.
const DEFAULT_MAX_FILES: usize = 500;

/// Extract a required string field from a JSON arguments object.
fn required_str(args: &serde_json::Value, field: &str) -> Result<String, ToolError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing required field: {field}")))
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

/// Read the UTF-8 content of a workspace file.
pub struct ReadFileTool {
    policy: Arc<SandboxPolicy>,
}

impl ReadFileTool {
    /// Create a read tool over the given sandbox policy.
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the UTF-8 text content of a file in the workspace."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path inside the workspace."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let rel = required_str(&args, "path")?;
        let path = safe_path(&self.policy, &rel)?;
        debug!(path = %path.display(), "reading file");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ToolError::FileNotFound(rel.clone()),
                _ => ToolError::ExecutionFailed(format!("read failed: {e}")),
            })?;
        Ok(json!({ "path": rel, "content": content }))
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// Write (or overwrite) a workspace file, creating parent directories.
pub struct WriteFileTool {
    policy: Arc<SandboxPolicy>,
}

impl WriteFileTool {
    /// Create a write tool over the given sandbox policy.
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write (or overwrite) a file in the workspace, creating parent directories as needed."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path inside the workspace."
                },
                "content": {
                    "type": "string",
                    "description": "File content as a UTF-8 string."
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let rel = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let path = safe_path(&self.policy, &rel)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("mkdir failed: {e}")))?;
        }
        debug!(path = %path.display(), bytes = content.len(), "writing file");
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("write failed: {e}")))?;
        Ok(json!({ "path": rel, "bytes_written": content.len() }))
    }
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

/// List files currently in the workspace, relative paths, sorted.
pub struct ListFilesTool {
    policy: Arc<SandboxPolicy>,
}

impl ListFilesTool {
    /// Create a list tool over the given sandbox policy.
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }
}

fn collect_files(root: &PathBuf, dir: &PathBuf, out: &mut Vec<String>, cap: usize) {
    if out.len() >= cap {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        if out.len() >= cap {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out, cap);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().into_owned());
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List all files currently in the workspace."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "max_files": {
                    "type": "integer",
                    "description": "Maximum number of files to return (default 500)."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let cap = args
            .get("max_files")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_FILES);
        let root = self.policy.root.canonicalize().map_err(|e| {
            ToolError::ExecutionFailed(format!("workspace unavailable: {e}"))
        })?;
        let mut files = Vec::new();
        collect_files(&root, &root, &mut files, cap);
        files.sort();
        Ok(json!({ "files": files, "count": files.len() }))
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
    async fn write_then_read_roundtrip() {
        let (_dir, policy) = setup();
        let write = WriteFileTool::new(policy.clone());
        let read = ReadFileTool::new(policy);

        write
            .execute(json!({"path": "src/app.py", "content": "print('hi')\n"}))
            .await
            .unwrap();
        let result = read.execute(json!({"path": "src/app.py"})).await.unwrap();
        assert_eq!(result["content"], "print('hi')\n");
    }

    #[tokio::test]
    async fn read_missing_file_is_file_not_found() {
        let (_dir, policy) = setup();
        let read = ReadFileTool::new(policy);
        let err = read.execute(json!({"path": "nope.txt"})).await.unwrap_err();
        assert!(matches!(err, ToolError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn write_escape_is_denied() {
        let (_dir, policy) = setup();
        let write = WriteFileTool::new(policy);
        let err = write
            .execute(json!({"path": "../evil.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn missing_args_are_invalid() {
        let (_dir, policy) = setup();
        let write = WriteFileTool::new(policy);
        let err = write.execute(json!({"path": "a.txt"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn list_files_recurses_and_sorts() {
        let (_dir, policy) = setup();
        let write = WriteFileTool::new(policy.clone());
        for path in ["b.txt", "a/one.txt", "a/two.txt"] {
            write
                .execute(json!({"path": path, "content": ""}))
                .await
                .unwrap();
        }
        let list = ListFilesTool::new(policy);
        let result = list.execute(json!({})).await.unwrap();
        let files: Vec<&str> = result["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(files, vec!["a/one.txt", "a/two.txt", "b.txt"]);
        assert_eq!(result["count"], 3);
    }

    #[tokio::test]
    async fn list_files_honours_cap() {
        let (_dir, policy) = setup();
        let write = WriteFileTool::new(policy.clone());
        for i in 0..5 {
            write
                .execute(json!({"path": format!("f{i}.txt"), "content": ""}))
                .await
                .unwrap();
        }
        let list = ListFilesTool::new(policy);
        let result = list.execute(json!({"max_files": 2})).await.unwrap();
        assert_eq!(result["count"], 2);
    }
}
