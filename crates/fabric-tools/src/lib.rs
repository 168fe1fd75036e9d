//! Tool implementations and specialist packs for the taskfabric runtime.
//!
//! The [`sandbox`] module is the safety floor: every filesystem and shell
//! tool goes through [`sandbox::safe_path`] or [`sandbox::run_cmd`], so no
//! path or command ever touches anything outside the per-run workspace.
//! On top of it sit the file, shell, and web tools, and the two built-in
//! specialist packs wired up by [`ConfigSpecialistRegistry`].

pub mod file_tools;
pub mod packs;
pub mod sandbox;
pub mod shell_tools;
pub mod web;

pub use packs::{
    build_engineering_pack, build_research_pack, ConfigSpecialistRegistry, EngineeringPack,
    ResearchPack,
};
pub use sandbox::{default_allowed_commands, run_cmd, safe_path, SandboxPolicy};
