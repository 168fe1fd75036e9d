//! `fabric run` -- execute one task end-to-end.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fabric_core::runtime::{execute_task, ExecuteTaskOptions, TaskError};
use fabric_core::workspace::FsRunRepository;
use fabric_core::SpecialistRegistry;
use fabric_llm::bootstrap::ensure_llm_available;
use fabric_llm::{build_chat_client, ProviderError};
use fabric_services::McpAugmentedRegistry;
use fabric_tools::ConfigSpecialistRegistry;
use fabric_types::profile::load_detected;
use fabric_types::{build_task, load_config, FabricConfig, Feature, FeatureSet, ProfileTier};

use super::workspace_root;

#[derive(Args)]
pub struct RunArgs {
    /// What you want the fabric to do.
    pub prompt: String,

    /// Force a pack (engineering|research). Leave empty for auto-routing.
    #[arg(long, default_value = "")]
    pub pack: String,

    /// Which model profile to use (quality|fast).
    #[arg(long, default_value = "quality")]
    pub model_key: String,

    /// Disallow network tools (web_search, fetch_url).
    #[arg(long)]
    pub no_network: bool,
}

/// Build the active feature set: detected tier (medium when no profile
/// has been detected yet) plus config overrides.
fn feature_set(config: &FabricConfig, tier: Option<ProfileTier>) -> FeatureSet {
    FeatureSet::from_profile(tier.unwrap_or(ProfileTier::Medium), &config.features)
}

/// Build the specialist registry, MCP-augmented when servers are
/// configured.
pub fn build_registry(
    config: &FabricConfig,
    features: &FeatureSet,
) -> anyhow::Result<Arc<dyn SpecialistRegistry>> {
    let base: Box<dyn SpecialistRegistry> = Box::new(ConfigSpecialistRegistry::new(config.clone()));
    if config.mcp_servers.is_empty() {
        return Ok(Arc::from(base));
    }
    features.require(
        Feature::Mcp,
        "Remove mcp_servers from the config or set mcp: true in config features.",
    )?;
    Ok(Arc::new(McpAugmentedRegistry::new(
        base,
        config.mcp_servers.clone(),
    )))
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let detected = load_detected(None);
    let features = feature_set(&config, detected.as_ref().map(|p| p.tier));
    let model_config = config.resolve_model(&args.model_key, detected.as_ref())?;

    if let Some(ensure) = config.ensure_llm.as_ref().filter(|e| e.enabled) {
        debug!(base_url = %model_config.base_url, "checking llm availability");
        ensure_llm_available(&model_config.base_url, &ensure.start_cmd, ensure.timeout_s)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let chat = match build_chat_client(&model_config, &features) {
        Ok(chat) => chat,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let repo = Arc::new(FsRunRepository::new(workspace_root()));
    let registry = build_registry(&config, &features)?;

    println!(
        "Using model: {} at {}",
        model_config.model, model_config.base_url
    );
    println!("Running task...");

    // Ctrl-C cancels the run cooperatively; the engine records the reason.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let task = build_task(
        args.prompt,
        Some(args.pack.as_str()),
        args.model_key,
        !args.no_network,
    );
    let result = execute_task(
        &task,
        chat,
        repo,
        registry.as_ref(),
        &config,
        &model_config,
        ExecuteTaskOptions {
            max_steps: None,
            cancel: Some(cancel),
        },
    )
    .await;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            print_task_error(&err, &model_config.base_url, &model_config.model);
            std::process::exit(1);
        }
    };

    println!();
    println!("Pack:      {}", result.specialist_id);
    println!("Run dir:   {}", result.run_dir.display());
    println!("Workspace: {}", result.workspace_path.display());
    println!("Model:     {}", result.model_name);
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&result.payload).unwrap_or_default()
    );
    Ok(())
}

/// Actionable transport-error messages, one per failure class.
fn print_task_error(err: &TaskError, base_url: &str, model: &str) {
    match err {
        TaskError::Llm(ProviderError::Unreachable(detail)) => {
            eprintln!("LLM server unreachable.");
            eprintln!("  URL: {base_url}");
            eprintln!("  Error: {detail}");
            eprintln!("  Install/start your backend (e.g. Ollama: ollama serve) or fix base_url.");
        }
        TaskError::Llm(ProviderError::Timeout) => {
            eprintln!("LLM read timeout. The model ({model}) took too long to respond.");
            eprintln!("  Use a smaller/faster model or increase timeout_s in the config.");
        }
        TaskError::Llm(ProviderError::ModelNotFound(detail)) => {
            eprintln!("Model not found (404).");
            eprintln!("  URL: {base_url}");
            eprintln!("  Detail: {detail}");
            eprintln!("  Pull it (e.g. ollama pull {model}) or set FABRIC_CONFIG_PATH.");
        }
        TaskError::Llm(ProviderError::BadStatus { status, body }) => {
            eprintln!("LLM server returned HTTP {status}.");
            eprintln!("  URL: {base_url}");
            eprintln!("  Detail: {body}");
        }
        other => eprintln!("error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::{McpServerConfig, McpTransportKind};

    #[test]
    fn registry_is_plain_without_mcp_servers() {
        let config = FabricConfig::default();
        let features = feature_set(&config, None);
        let registry = build_registry(&config, &features).unwrap();
        assert_eq!(registry.list_ids(), vec!["engineering", "research"]);
    }

    #[test]
    fn registry_requires_mcp_feature_when_servers_configured() {
        let mut config = FabricConfig::default();
        config.mcp_servers.push(McpServerConfig {
            name: "github".into(),
            transport: McpTransportKind::Stdio,
            command: "github-mcp".into(),
            args: vec![],
            env: Default::default(),
            url: String::new(),
            headers: Default::default(),
        });
        config.features.mcp = Some(false);
        let features = feature_set(&config, None);
        let err = match build_registry(&config, &features) {
            Err(e) => e,
            Ok(_) => panic!("expected build_registry to fail"),
        };
        assert!(err.to_string().contains("mcp"));
    }

    #[test]
    fn feature_set_uses_medium_tier_without_profile() {
        let config = FabricConfig::default();
        let features = feature_set(&config, None);
        assert!(features.is_enabled(Feature::Mcp));
        assert!(!features.is_enabled(Feature::Container));
    }
}
