//! API endpoint handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use fabric_core::runtime::{execute_task, ExecuteTaskOptions, TaskError};
use fabric_core::workspace::reader;
use fabric_llm::{build_chat_client, ProviderError};
use fabric_types::{build_task, FabricError};

use super::ApiState;

/// Request body for `POST /run`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// The task prompt.
    pub prompt: String,
    /// Forced pack id; absent or empty means auto-routing.
    #[serde(default)]
    pub pack: Option<String>,
    /// Model profile key.
    #[serde(default = "default_model_key")]
    pub model_key: String,
    /// Whether network tools may be offered.
    #[serde(default = "default_true")]
    pub network_allowed: bool,
}

fn default_model_key() -> String {
    "quality".into()
}

fn default_true() -> bool {
    true
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "detail": detail.into() })),
    )
}

/// `GET /health` -- liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// `POST /run` -- execute one task and return the finish payload plus run
/// metadata.
pub async fn run_task(
    State(state): State<ApiState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(
        prompt = %request.prompt.chars().take(80).collect::<String>(),
        pack = ?request.pack,
        model_key = %request.model_key,
        network = request.network_allowed,
        "POST /run"
    );

    let model_config = state
        .config
        .model(&request.model_key)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let chat = build_chat_client(model_config, &state.features).map_err(|e| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("chat client unavailable: {e}"),
        )
    })?;

    let task = build_task(
        request.prompt,
        request.pack.as_deref(),
        request.model_key,
        request.network_allowed,
    );

    let result = execute_task(
        &task,
        chat,
        state.repo.clone(),
        state.registry.as_ref(),
        &state.config,
        model_config,
        ExecuteTaskOptions::default(),
    )
    .await
    .map_err(map_task_error)?;

    info!(run_id = %result.run_id, pack = %result.specialist_id, "POST /run completed");

    let mut out = serde_json::Map::new();
    out.extend(result.payload.clone());
    out.insert(
        "_meta".into(),
        serde_json::json!({
            "pack": result.specialist_id,
            "run_dir": result.run_dir,
            "workspace": result.workspace_path,
            "model": result.model_name,
            "run_id": result.run_id,
        }),
    );
    Ok(Json(serde_json::Value::Object(out)))
}

fn map_task_error(err: TaskError) -> ApiError {
    match err {
        TaskError::Llm(ProviderError::Unreachable(detail)) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("llm server unreachable: {detail}; start your backend or fix base_url"),
        ),
        TaskError::Llm(ProviderError::ModelNotFound(detail)) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("model not found: {detail}; pull the model or fix the config"),
        ),
        TaskError::Llm(ProviderError::Timeout) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "llm request timed out; use a faster model or raise timeout_s",
        ),
        TaskError::Llm(other) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, other.to_string())
        }
        TaskError::Domain(FabricError::UnknownSpecialist(id)) => {
            error_response(StatusCode::BAD_REQUEST, format!("unknown specialist: {id}"))
        }
        TaskError::Domain(other) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// `GET /runs` -- recent run summaries, most recent first.
pub async fn list_runs(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let runs = reader::list_runs(&state.workspace_root, 20);
    Json(serde_json::json!({ "runs": runs }))
}

/// `GET /runs/{run_id}` -- all events of one run.
pub async fn show_run(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let events = reader::read_run_events(&run_id, &state.workspace_root)
        .map_err(|e| error_response(StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(serde_json::json!({ "run_id": run_id, "events": events })))
}
