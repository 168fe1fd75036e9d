//! HTTP API for the taskfabric runtime.
//!
//! `GET /health` (liveness, exempt from rate limiting), `POST /run` (one
//! task end-to-end), `GET /runs` and `GET /runs/{id}` (run-log reader).
//! A per-client sliding-window rate limiter runs as middleware; excess
//! requests get 429 with a `Retry-After` hint.

pub mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use fabric_core::pack::SpecialistRegistry;
use fabric_core::workspace::RunRepository;
use fabric_types::{FabricConfig, FeatureSet};

use crate::rate_limit::{RateDecision, RateLimiter};

/// Environment variable for the per-client requests-per-minute limit.
/// Unset or 0 disables limiting.
pub const RATE_LIMIT_ENV: &str = "FABRIC_RATE_LIMIT_RPM";

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Loaded runtime configuration.
    pub config: Arc<FabricConfig>,
    /// Enabled features for this session.
    pub features: Arc<FeatureSet>,
    /// Run repository (create + append).
    pub repo: Arc<dyn RunRepository>,
    /// Specialist registry, possibly MCP-augmented.
    pub registry: Arc<dyn SpecialistRegistry>,
    /// Workspace root for the run-log reader endpoints.
    pub workspace_root: PathBuf,
    /// Per-client limiter.
    pub limiter: Arc<RateLimiter>,
    /// Requests per minute per client; 0 = unlimited.
    pub rate_limit_rpm: u32,
}

/// Read the rate limit from the environment (0 when unset or malformed).
pub fn rate_limit_from_env() -> u32 {
    std::env::var(RATE_LIMIT_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Build the API router over the given state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/run", post(handlers::run_task))
        .route("/runs", get(handlers::list_runs))
        .route("/runs/{run_id}", get(handlers::show_run))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until the process exits.
pub async fn serve(state: ApiState, addr: SocketAddr) -> crate::error::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Sliding-window rate limiting, keyed by client IP. Liveness probes are
/// exempt so orchestrators never get throttled out of health checks.
async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string());

    match state.limiter.check(&client, state.rate_limit_rpm) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after_s } => {
            warn!(client = %client, retry_after_s, "rate limited");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "detail": "rate limit exceeded; retry later",
                    "retry_after_s": retry_after_s,
                })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_s.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
            response
        }
    }
}
