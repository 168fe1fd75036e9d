//! CLI subcommands.

pub mod logs;
pub mod run;
pub mod serve;

use std::path::PathBuf;

/// Workspace root: `$FABRIC_WORKSPACE`, else `.taskfabric`.
pub fn workspace_root() -> PathBuf {
    std::env::var("FABRIC_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".taskfabric"))
}
