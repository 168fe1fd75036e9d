//! `fabric serve` -- run the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;

use fabric_core::workspace::FsRunRepository;
use fabric_services::api::{self, ApiState};
use fabric_services::RateLimiter;
use fabric_types::profile::load_detected;
use fabric_types::{load_config, FeatureSet, ProfileTier};

use super::run::build_registry;
use super::workspace_root;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 8787)]
    pub port: u16,
}

pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let detected = load_detected(None);
    let tier = detected.map(|p| p.tier).unwrap_or(ProfileTier::Medium);
    let features = FeatureSet::from_profile(tier, &config.features);

    let registry = build_registry(&config, &features)?;
    let root = workspace_root();
    let state = ApiState {
        config: Arc::new(config),
        features: Arc::new(features),
        repo: Arc::new(FsRunRepository::new(&root)),
        registry,
        workspace_root: root,
        limiter: Arc::new(RateLimiter::new(60)),
        rate_limit_rpm: api::rate_limit_from_env(),
    };

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    println!("Serving taskfabric API on http://{addr}");
    api::serve(state, addr).await?;
    Ok(())
}
