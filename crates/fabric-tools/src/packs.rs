//! The built-in specialist packs and the config-backed registry.
//!
//! A pack owns its system prompt, its tool set, and its finish-payload
//! quality gate. The engineering pack demands verified tests; the
//! research pack demands a real summary and deliverables. Network gating
//! happens at build time: with `network_allowed = false` the research
//! pack's web tools are not in `tool_definitions` at all, so the model
//! cannot attempt to call them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fabric_core::pack::{finish_tool_def, SpecialistPack, SpecialistRegistry};
use fabric_core::tools::{ToolError, ToolSet};
use fabric_types::{FabricConfig, FabricError};

use crate::file_tools::{ListFilesTool, ReadFileTool, WriteFileTool};
use crate::sandbox::SandboxPolicy;
use crate::shell_tools::{RunTestsTool, ShellTool};
use crate::web::{FetchUrlTool, WebSearchTool};

const ENGINEERING_SYSTEM_PROMPT: &str = "\
You are an engineering specialist working inside a sandboxed workspace.

You build, run, and verify software using only your tools:
- write_file / read_file / list_files for workspace files,
- shell for allowlisted commands (python, pytest, git, make, ...),
- run_tests to run the verification command for your work.

Work in small steps: write code, run it, read the output, fix it. Every
path is relative to the workspace; absolute paths and parent-directory
escapes are rejected.

When the task is complete, call finish_task with:
- summary: what you built and how you verified it,
- artifacts: the workspace files you produced,
- next_steps: reasonable follow-ups (may be empty),
- notes: caveats worth recording (may be empty),
- tests_verified: true only after run_tests actually passed.

finish_task is rejected until tests_verified is true, so run your tests
first.";

const RESEARCH_SYSTEM_PROMPT: &str = "\
You are a research specialist working inside a sandboxed workspace.

You gather, read, and synthesise written material using only your tools:
- web_search / fetch_url for online sources (when available),
- write_file / read_file / list_files for notes and deliverables.

Write your findings into workspace files as you go; the workspace is the
record of your work.

When the task is complete, call finish_task with:
- summary: the synthesised answer,
- deliverables: the workspace files containing your write-up,
- sources: the URLs or documents you drew on (may be empty),
- notes: limitations or open questions (may be empty).

finish_task is rejected while summary is empty or deliverables name no
files.";

/// The engineering pack: build and verify code in the sandbox.
pub struct EngineeringPack {
    tools: ToolSet,
}

/// Build the engineering pack for one run's workspace.
///
/// The tool set is identical regardless of `network_allowed`: the pack
/// has no network-touching tools to omit.
pub fn build_engineering_pack(workspace_path: &Path, network_allowed: bool) -> EngineeringPack {
    let mut policy = SandboxPolicy::new(workspace_path);
    policy.network_allowed = network_allowed;
    let policy = Arc::new(policy);

    let mut tools = ToolSet::new();
    tools.register(Arc::new(ShellTool::new(policy.clone())));
    tools.register(Arc::new(ReadFileTool::new(policy.clone())));
    tools.register(Arc::new(WriteFileTool::new(policy.clone())));
    tools.register(Arc::new(ListFilesTool::new(policy.clone())));
    tools.register(Arc::new(RunTestsTool::new(policy)));
    EngineeringPack { tools }
}

impl EngineeringPack {
    /// Tool names in registration order (without the finish tool).
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }
}

#[async_trait]
impl SpecialistPack for EngineeringPack {
    fn specialist_id(&self) -> &str {
        "engineering"
    }

    fn system_prompt(&self) -> &str {
        ENGINEERING_SYSTEM_PROMPT
    }

    fn tool_definitions(&self) -> Vec<serde_json::Value> {
        let mut defs = self.tools.schemas();
        defs.push(finish_tool_def(
            "Finish the task. Call only after run_tests passed.",
            json!({
                "summary": {"type": "string", "description": "What was built and how it was verified."},
                "artifacts": {"type": "array", "items": {"type": "string"}, "description": "Workspace files produced."},
                "next_steps": {"type": "array", "items": {"type": "string"}},
                "notes": {"type": "string"},
                "tests_verified": {"type": "boolean", "description": "True only after run_tests passed."}
            }),
            &["summary", "artifacts", "next_steps", "notes", "tests_verified"],
        ));
        defs
    }

    fn finish_required_fields(&self) -> Vec<String> {
        ["summary", "artifacts", "next_steps", "notes", "tests_verified"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.tools.execute(name, args).await
    }

    fn validate_finish_payload(&self, args: &serde_json::Value) -> Option<String> {
        // A missing field is the required-fields layer's job, not the
        // quality gate's.
        match args.get("tests_verified") {
            None => None,
            Some(v) if v == &json!(true) => None,
            Some(_) => Some(
                "tests_verified must be true; use the run_tests tool to verify \
                 your work, then finish again"
                    .into(),
            ),
        }
    }
}

/// The research pack: gather and synthesise written material.
pub struct ResearchPack {
    tools: ToolSet,
}

/// Build the research pack for one run's workspace.
///
/// `network_allowed = false` omits `web_search` and `fetch_url` from the
/// tool set entirely.
pub fn build_research_pack(
    workspace_path: &Path,
    network_allowed: bool,
    search_endpoint: Option<String>,
) -> ResearchPack {
    let mut policy = SandboxPolicy::new(workspace_path);
    policy.network_allowed = network_allowed;
    let policy = Arc::new(policy);

    let mut tools = ToolSet::new();
    if network_allowed {
        tools.register(Arc::new(WebSearchTool::new(search_endpoint)));
        tools.register(Arc::new(FetchUrlTool::new()));
    }
    tools.register(Arc::new(ReadFileTool::new(policy.clone())));
    tools.register(Arc::new(WriteFileTool::new(policy.clone())));
    tools.register(Arc::new(ListFilesTool::new(policy)));
    ResearchPack { tools }
}

impl ResearchPack {
    /// Tool names in registration order (without the finish tool).
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }
}

#[async_trait]
impl SpecialistPack for ResearchPack {
    fn specialist_id(&self) -> &str {
        "research"
    }

    fn system_prompt(&self) -> &str {
        RESEARCH_SYSTEM_PROMPT
    }

    fn tool_definitions(&self) -> Vec<serde_json::Value> {
        let mut defs = self.tools.schemas();
        defs.push(finish_tool_def(
            "Finish the task with the synthesised findings.",
            json!({
                "summary": {"type": "string", "description": "The synthesised answer."},
                "deliverables": {"type": "array", "items": {"type": "string"}, "description": "Workspace files containing the write-up."},
                "sources": {"type": "array", "items": {"type": "string"}},
                "notes": {"type": "string"}
            }),
            &["summary", "deliverables", "sources", "notes"],
        ));
        defs
    }

    fn finish_required_fields(&self) -> Vec<String> {
        ["summary", "deliverables", "sources", "notes"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.tools.execute(name, args).await
    }

    fn validate_finish_payload(&self, args: &serde_json::Value) -> Option<String> {
        if let Some(summary) = args.get("summary") {
            if summary.as_str().map_or(false, |s| s.trim().is_empty()) {
                return Some("summary must not be empty".into());
            }
        }
        if let Some(deliverables) = args.get("deliverables") {
            if deliverables.as_array().map_or(false, |d| d.is_empty()) {
                return Some("deliverables must name at least one workspace file".into());
            }
        }
        None
    }
}

/// Config-backed registry for the built-in packs.
pub struct ConfigSpecialistRegistry {
    config: FabricConfig,
}

impl ConfigSpecialistRegistry {
    /// Create a registry over the loaded configuration.
    pub fn new(config: FabricConfig) -> Self {
        Self { config }
    }
}

impl SpecialistRegistry for ConfigSpecialistRegistry {
    fn get_pack(
        &self,
        specialist_id: &str,
        workspace_path: &Path,
        network_allowed: bool,
    ) -> fabric_types::Result<Box<dyn SpecialistPack>> {
        match specialist_id {
            "engineering" => Ok(Box::new(build_engineering_pack(
                workspace_path,
                network_allowed,
            ))),
            "research" => Ok(Box::new(build_research_pack(
                workspace_path,
                network_allowed,
                self.config.search_endpoint.clone(),
            ))),
            other => Err(FabricError::UnknownSpecialist(format!(
                "{other} (available: {})",
                self.list_ids().join(", ")
            ))),
        }
    }

    fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .config
            .specialists
            .iter()
            .map(|s| s.id.clone())
            .filter(|id| id == "engineering" || id == "research")
            .collect();
        if ids.is_empty() {
            ids = vec!["engineering".into(), "research".into()];
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_names_from_defs(pack: &dyn SpecialistPack) -> Vec<String> {
        pack.tool_definitions()
            .iter()
            .map(|d| d["function"]["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn engineering_pack_has_expected_tools() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        let names = pack.tool_names();
        for tool in ["shell", "read_file", "write_file", "list_files", "run_tests"] {
            assert!(names.contains(&tool.to_string()), "missing {tool}");
        }
    }

    #[test]
    fn engineering_tools_unchanged_by_network_flag() {
        let dir = tempfile::tempdir().unwrap();
        let offline = build_engineering_pack(dir.path(), false).tool_names();
        let online = build_engineering_pack(dir.path(), true).tool_names();
        assert_eq!(offline, online);
        assert_eq!(
            offline,
            vec!["shell", "read_file", "write_file", "list_files", "run_tests"]
        );
    }

    #[test]
    fn research_network_gating_omits_web_tools() {
        let dir = tempfile::tempdir().unwrap();
        let online = build_research_pack(dir.path(), true, None);
        assert!(online.tool_names().contains(&"web_search".to_string()));
        assert!(online.tool_names().contains(&"fetch_url".to_string()));

        let offline = build_research_pack(dir.path(), false, None);
        let names = offline.tool_names();
        assert!(!names.contains(&"web_search".to_string()));
        assert!(!names.contains(&"fetch_url".to_string()));
        assert!(names.contains(&"write_file".to_string()));
        assert!(names.contains(&"read_file".to_string()));
        assert!(names.contains(&"list_files".to_string()));

        // The same holds for the definitions offered to the model.
        let def_names = tool_names_from_defs(&offline);
        assert!(!def_names.iter().any(|n| n == "web_search" || n == "fetch_url"));
    }

    #[test]
    fn finish_tool_in_definitions_for_both_packs() {
        let dir = tempfile::tempdir().unwrap();
        let engineering = build_engineering_pack(dir.path(), false);
        let research = build_research_pack(dir.path(), false, None);
        for pack in [&engineering as &dyn SpecialistPack, &research] {
            let names = tool_names_from_defs(pack);
            assert!(names.contains(&"finish_task".to_string()));
            assert_eq!(pack.finish_tool_name(), "finish_task");
        }
    }

    #[test]
    fn tool_definitions_are_valid_openai_format() {
        let dir = tempfile::tempdir().unwrap();
        let engineering = build_engineering_pack(dir.path(), false);
        let research = build_research_pack(dir.path(), true, None);
        for pack in [&engineering as &dyn SpecialistPack, &research] {
            for def in pack.tool_definitions() {
                assert_eq!(def["type"], "function");
                assert!(def["function"]["name"].is_string());
                assert!(def["function"]["parameters"].is_object());
            }
        }
    }

    #[test]
    fn engineering_gate_requires_verified_tests() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        assert!(pack
            .finish_required_fields()
            .contains(&"tests_verified".to_string()));

        let rejected = pack.validate_finish_payload(&json!({
            "summary": "all done",
            "artifacts": [],
            "next_steps": [],
            "notes": "",
            "tests_verified": false,
        }));
        let error = rejected.expect("tests_verified=false must be rejected");
        assert!(error.contains("tests_verified") || error.contains("run_tests"));

        let accepted = pack.validate_finish_payload(&json!({
            "summary": "all done",
            "artifacts": [],
            "next_steps": [],
            "notes": "",
            "tests_verified": true,
        }));
        assert!(accepted.is_none());
    }

    #[test]
    fn engineering_gate_ignores_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        // Missing tests_verified is the required-fields layer's problem.
        assert!(pack
            .validate_finish_payload(&json!({"summary": "done"}))
            .is_none());
    }

    #[test]
    fn engineering_gate_rejects_non_boolean_truthiness() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        assert!(pack
            .validate_finish_payload(&json!({"tests_verified": "yes"}))
            .is_some());
    }

    #[test]
    fn research_gate_demands_substance() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_research_pack(dir.path(), false, None);

        assert!(pack
            .validate_finish_payload(&json!({"summary": "  ", "deliverables": ["notes.md"]}))
            .is_some());
        assert!(pack
            .validate_finish_payload(&json!({"summary": "findings", "deliverables": []}))
            .is_some());
        assert!(pack
            .validate_finish_payload(
                &json!({"summary": "findings", "deliverables": ["notes.md"], "sources": [], "notes": ""})
            )
            .is_none());
    }

    #[test]
    fn validation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        let payload = json!({"tests_verified": false});
        assert_eq!(
            pack.validate_finish_payload(&payload),
            pack.validate_finish_payload(&payload)
        );
    }

    #[tokio::test]
    async fn execute_tool_dispatches_to_toolset() {
        let dir = tempfile::tempdir().unwrap();
        let pack = build_engineering_pack(dir.path(), false);
        let result = pack
            .execute_tool("write_file", json!({"path": "a.txt", "content": "x"}))
            .await
            .unwrap();
        assert_eq!(result["bytes_written"], 1);

        let err = pack.execute_tool("web_search", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn registry_builds_known_packs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConfigSpecialistRegistry::new(FabricConfig::default());
        let pack = registry.get_pack("engineering", dir.path(), false).unwrap();
        assert_eq!(pack.specialist_id(), "engineering");
        let pack = registry.get_pack("research", dir.path(), true).unwrap();
        assert_eq!(pack.specialist_id(), "research");
    }

    #[test]
    fn registry_unknown_pack_names_alternatives() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConfigSpecialistRegistry::new(FabricConfig::default());
        let err = match registry.get_pack("astrology", dir.path(), false) {
            Err(e) => e,
            Ok(_) => panic!("expected get_pack to fail"),
        };
        assert!(err.to_string().contains("engineering"));
    }

    #[test]
    fn registry_lists_config_order() {
        let registry = ConfigSpecialistRegistry::new(FabricConfig::default());
        assert_eq!(registry.list_ids(), vec!["engineering", "research"]);
    }
}
