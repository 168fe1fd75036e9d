//! The task entry point: resolve, recruit, run, and record.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fabric_llm::{ChatClient, ProviderError};
use fabric_types::{FabricConfig, FabricError, ModelConfig, RunResult, Task};

use crate::engine::ToolLoopEngine;
use crate::pack::SpecialistRegistry;
use crate::recruit::recruit_specialist;
use crate::workspace::{EventKind, RunRepository};

/// Failure modes of one task execution.
///
/// Transport-level LLM errors keep their structure so the CLI and HTTP
/// surfaces can give actionable advice (unreachable vs. 404 vs. timeout).
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A transport-level LLM failure.
    #[error(transparent)]
    Llm(#[from] ProviderError),

    /// A domain-level failure (config, sandbox, registry, run log).
    #[error(transparent)]
    Domain(#[from] FabricError),
}

/// Knobs for [`execute_task`] beyond the task itself.
#[derive(Default)]
pub struct ExecuteTaskOptions {
    /// Step budget override; `None` uses the config default.
    pub max_steps: Option<u32>,

    /// Cooperative cancellation for the whole task.
    pub cancel: Option<CancellationToken>,
}

/// Execute one task end-to-end.
///
/// Creates the run, recruits (or accepts) the specialist, opens the pack,
/// drives the tool loop, and always closes the pack before returning.
/// Transport-level LLM errors are recorded as an `error` event and
/// returned to the caller.
pub async fn execute_task(
    task: &Task,
    chat: Arc<dyn ChatClient>,
    repo: Arc<dyn RunRepository>,
    registry: &dyn SpecialistRegistry,
    config: &FabricConfig,
    model_config: &ModelConfig,
    options: ExecuteTaskOptions,
) -> Result<RunResult, TaskError> {
    let run = repo.create_run()?;

    let (specialist_id, routing_method) = match &task.specialist_id {
        Some(id) => (id.clone(), "explicit"),
        None => (recruit_specialist(&task.prompt, config), "keyword"),
    };
    repo.append_event(
        &run.run_id,
        EventKind::Recruitment,
        None,
        json!({
            "specialist_id": specialist_id.as_str(),
            "specialist_ids": [specialist_id.as_str()],
            "routing_method": routing_method,
        }),
    )?;
    info!(
        run_id = %run.run_id,
        specialist = %specialist_id,
        routing = routing_method,
        "run created"
    );

    let mut pack = registry.get_pack(&specialist_id, &run.workspace_path, task.network_allowed)?;
    if let Err(err) = pack.open().await {
        repo.append_event(
            &run.run_id,
            EventKind::Error,
            None,
            json!({"reason": "pack_open_failed", "error": err.to_string()}),
        )?;
        return Err(TaskError::Domain(err));
    }

    repo.append_event(
        &run.run_id,
        EventKind::Prompt,
        None,
        json!({
            "prompt": task.prompt.as_str(),
            "model": model_config.model.as_str(),
            "model_key": task.model_key.as_str(),
            "network_allowed": task.network_allowed,
        }),
    )?;

    let max_steps = options.max_steps.unwrap_or(config.default_max_steps);
    let mut engine = ToolLoopEngine::new(chat, repo.clone(), max_steps);
    if let Some(token) = options.cancel {
        engine = engine.with_cancel(token);
    }

    let outcome = engine
        .run(&*pack, &run, task, &model_config.model)
        .await;

    if let Err(err) = pack.close().await {
        warn!(run_id = %run.run_id, error = %err, "pack close failed");
    }

    match outcome {
        Ok(result) => Ok(result),
        Err(err) => {
            repo.append_event(
                &run.run_id,
                EventKind::Error,
                None,
                json!({"reason": "llm_transport", "error": err.to_string()}),
            )?;
            Err(err)
        }
    }
}
