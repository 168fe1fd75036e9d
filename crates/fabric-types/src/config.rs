//! Runtime configuration: model profiles, specialists, remote tool servers.
//!
//! The configuration is a JSON document loaded from `$FABRIC_CONFIG_PATH`
//! (default `~/.taskfabric/config.json`). A missing file yields the built-in
//! defaults; a malformed file is an error rather than a silent fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_STEPS, LLM_CHAT_DEFAULT_TIMEOUT_S};
use crate::error::{FabricError, Result};
use crate::features::FeatureOverrides;

/// Which chat-client implementation a model profile uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI-compatible client with local-server workarounds: detects the
    /// "does not support tools" 400 and retries unknown-field 400s with a
    /// minimal payload. The default, matching the local-first posture.
    Lenient,
    /// Bare OpenAI-compatible client; no retries. For cloud endpoints and
    /// servers that faithfully implement the spec.
    Generic,
    /// In-process local inference. Gated behind the `inprocess` feature.
    Inprocess,
}

impl Default for Backend {
    fn default() -> Self {
        Self::Lenient
    }
}

/// Cloud-fallback wiring for one model profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFallbackConfig {
    /// Cloud model name passed to the cloud client.
    pub model: String,

    /// Cloud endpoint base URL.
    pub base_url: String,

    /// API key for the cloud endpoint.
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout for cloud calls.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,

    /// Fallback trigger policy: "no_tool_calls", "malformed_args",
    /// "always"; anything else never triggers.
    #[serde(default = "default_fallback_policy")]
    pub policy: String,
}

fn default_fallback_policy() -> String {
    "no_tool_calls".into()
}

/// One model profile (selected by `Task::model_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which client implementation to use.
    #[serde(default)]
    pub backend: Backend,

    /// Model name sent in the chat-completions request. An empty name is
    /// filled from the detected profile (or the built-in default) by
    /// [`FabricConfig::resolve_model`].
    #[serde(default)]
    pub model: String,

    /// OpenAI-compatible base URL (ending in `/v1` for most servers).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; empty means no Authorization header.
    #[serde(default)]
    pub api_key: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,

    /// Optional cloud-fallback decorator configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudFallbackConfig>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_timeout_s() -> u64 {
    LLM_CHAT_DEFAULT_TIMEOUT_S
}

/// One specialist pack entry. List order in [`FabricConfig::specialists`]
/// is the recruiter's tie-break order: first listed wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    /// Pack id (e.g. "engineering").
    pub id: String,

    /// Human-readable description, shown by the CLI.
    #[serde(default)]
    pub description: String,

    /// Keywords scored against the lowercased task prompt.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Transport used to reach a remote tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Child process speaking JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP endpoint (SSE-style servers accept JSON-RPC POSTs).
    Sse,
}

/// Configuration for one remote tool (MCP) server.
///
/// The `name` doubles as the tool namespace prefix:
/// `remote__<name>__<tool>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name, used as the namespace prefix.
    pub name: String,

    /// Transport kind.
    pub transport: McpTransportKind,

    /// Command to spawn (stdio transport).
    #[serde(default)]
    pub command: String,

    /// Arguments for the command (stdio transport).
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process (stdio transport).
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (sse transport).
    #[serde(default)]
    pub url: String,

    /// Extra HTTP headers (sse transport).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Optional "start the LLM server if it is down" behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureLlmConfig {
    /// Whether to probe (and possibly start) the backend before the first
    /// chat call.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command to start the backend, e.g. `["ollama", "serve"]`. Empty
    /// means probe-only.
    #[serde(default)]
    pub start_cmd: Vec<String>,

    /// How long to wait for the server to become healthy after starting.
    #[serde(default = "default_ensure_timeout_s")]
    pub timeout_s: u64,
}

fn default_true() -> bool {
    true
}

fn default_ensure_timeout_s() -> u64 {
    90
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Model profiles keyed by model key ("quality", "fast", ...).
    pub models: HashMap<String, ModelConfig>,

    /// Specialist packs in priority order.
    pub specialists: Vec<SpecialistConfig>,

    /// Remote tool servers attached to every pack when the `mcp` feature
    /// is enabled.
    pub mcp_servers: Vec<McpServerConfig>,

    /// Per-feature overrides on top of the detected profile tier.
    pub features: FeatureOverrides,

    /// Step budget for the tool loop.
    pub default_max_steps: u32,

    /// Search API endpoint for the `web_search` tool. `None` means the
    /// tool answers with a structured "not configured" reply.
    pub search_endpoint: Option<String>,

    /// Optional LLM-server bootstrap behaviour.
    pub ensure_llm: Option<EnsureLlmConfig>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            specialists: default_specialists(),
            mcp_servers: Vec::new(),
            features: FeatureOverrides::default(),
            default_max_steps: DEFAULT_MAX_STEPS,
            search_endpoint: None,
            ensure_llm: None,
        }
    }
}

impl FabricConfig {
    /// Look up a model profile by key.
    pub fn model(&self, model_key: &str) -> Result<&ModelConfig> {
        self.models
            .get(model_key)
            .ok_or_else(|| FabricError::UnknownModelKey(model_key.to_string()))
    }

    /// Look up a model profile and fill an empty model name from the
    /// detected hardware profile (falling back to the built-in default
    /// for the key).
    pub fn resolve_model(
        &self,
        model_key: &str,
        profile: Option<&crate::profile::SystemProfile>,
    ) -> Result<ModelConfig> {
        let mut resolved = self.model(model_key)?.clone();
        if resolved.model.is_empty() {
            let from_profile = profile.map(|p| match model_key {
                "fast" => p.fast_model.clone(),
                _ => p.quality_model.clone(),
            });
            let from_default = default_models()
                .get(model_key)
                .map(|m| m.model.clone())
                .unwrap_or_default();
            resolved.model = from_profile.filter(|m| !m.is_empty()).unwrap_or(from_default);
        }
        if resolved.model.is_empty() {
            return Err(FabricError::ConfigInvalid {
                reason: format!("model key '{model_key}' has no model name configured"),
            });
        }
        Ok(resolved)
    }

    /// Look up a specialist entry by id.
    pub fn specialist(&self, id: &str) -> Option<&SpecialistConfig> {
        self.specialists.iter().find(|s| s.id == id)
    }
}

fn default_models() -> HashMap<String, ModelConfig> {
    let mut models = HashMap::new();
    models.insert(
        "quality".to_string(),
        ModelConfig {
            backend: Backend::Lenient,
            model: "qwen2.5:14b".into(),
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_s: 360,
            cloud: None,
        },
    );
    models.insert(
        "fast".to_string(),
        ModelConfig {
            backend: Backend::Lenient,
            model: "qwen2.5:7b".into(),
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_s: default_timeout_s(),
            cloud: None,
        },
    );
    models
}

fn default_specialists() -> Vec<SpecialistConfig> {
    vec![
        SpecialistConfig {
            id: "engineering".into(),
            description: "Builds, tests, and ships code inside the sandbox".into(),
            keywords: [
                "build",
                "implement",
                "code",
                "service",
                "pipeline",
                "kubernetes",
                "scala",
                "rust",
                "python",
                "deploy",
                "compile",
                "develop",
                "program",
                "script",
                "pytest",
                "unit test",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        },
        SpecialistConfig {
            id: "research".into(),
            description: "Gathers, reads, and synthesises written material".into(),
            keywords: [
                "literature",
                "systematic review",
                "paper",
                "arxiv",
                "survey",
                "bibliography",
                "citations",
                "references",
                "web search",
                "search the web",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        },
    ]
}

/// Resolve the config file path: `$FABRIC_CONFIG_PATH`, else
/// `~/.taskfabric/config.json`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("FABRIC_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskfabric")
        .join("config.json")
}

/// Load the configuration from disk, or the defaults when no file exists.
pub fn load_config() -> Result<FabricConfig> {
    load_config_from(&config_path())
}

/// Load the configuration from an explicit path. Useful in tests.
pub fn load_config_from(path: &Path) -> Result<FabricConfig> {
    if !path.is_file() {
        return Ok(FabricConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| FabricError::ConfigInvalid {
        reason: format!("{}: {e}", path.display()),
    })
}
