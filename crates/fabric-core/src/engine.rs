//! The tool-loop engine.
//!
//! Drives one task to a terminal state over a bounded number of steps:
//!
//! ```text
//! system + user prompt
//!   |
//!   v
//! chat completion  <-------------------------+
//!   |                                        |
//!   v                                        |
//! dispatch tool calls in order               |
//!   |  - finish_task: validate, terminate    |
//!   |  - other: execute, append tool result -+
//!   v
//! RunResult (finish payload, or a synthetic terminator)
//! ```
//!
//! The engine does deterministic conversation bookkeeping and tool
//! dispatch, nothing more: tool calls from a single assistant message run
//! serially in wire order (the protocol expects one `tool` message per
//! `tool_call_id`), and there is no streaming. Tool-level failures are
//! values fed back into the conversation; transport-level LLM failures
//! bubble out to the entry point.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fabric_llm::{ChatClient, ChatMessage, ChatRequest, FunctionCall, ProviderError, ToolCall};
use fabric_types::constants::{
    MAX_EMPTY_RESPONSES, MAX_LLM_CONTENT_IN_RUNLOG_CHARS, MAX_TOOL_OUTPUT_CHARS,
    MAX_VALIDATION_FAILURES,
};
use fabric_types::{RunResult, Task};

use crate::pack::SpecialistPack;
use crate::runtime::TaskError;
use crate::workspace::{EventKind, RunHandle, RunRepository};

/// Nudge injected when the model returns neither content nor tool calls.
const EMPTY_RESPONSE_NUDGE: &str = "You must call a tool or call `finish_task`.";

/// The bounded, serial control loop for one task.
pub struct ToolLoopEngine {
    chat: Arc<dyn ChatClient>,
    repo: Arc<dyn RunRepository>,
    max_steps: u32,
    cancel: Option<CancellationToken>,
}

impl ToolLoopEngine {
    /// Create an engine over a chat client and run repository.
    pub fn new(chat: Arc<dyn ChatClient>, repo: Arc<dyn RunRepository>, max_steps: u32) -> Self {
        Self {
            chat,
            repo,
            max_steps: max_steps.max(1),
            cancel: None,
        }
    }

    /// Attach a cancellation token. Cancellation is cooperative: it is
    /// observed at the next LLM call boundary.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the loop for `task` against an opened pack.
    pub async fn run(
        &self,
        pack: &dyn SpecialistPack,
        run: &RunHandle,
        task: &Task,
        model_name: &str,
    ) -> Result<RunResult, TaskError> {
        let mut messages = vec![
            ChatMessage::system(pack.system_prompt()),
            ChatMessage::user(&task.prompt),
        ];
        let tools = pack.tool_definitions();
        let finish_tool = pack.finish_tool_name().to_string();
        let required_fields = pack.finish_required_fields();

        let mut empty_streak: u32 = 0;
        let mut validation_failures: u32 = 0;
        let mut last_content: Option<String> = None;

        for step in 0..self.max_steps {
            let step_label = step.to_string();

            let request =
                ChatRequest::new(model_name, messages.clone()).with_tools(tools.clone());
            let response = match self.call_model(&request).await {
                ModelCallOutcome::Response(response) => response,
                ModelCallOutcome::Cancelled => {
                    self.repo.append_event(
                        &run.run_id,
                        EventKind::Error,
                        Some(step_label.as_str()),
                        json!({"reason": "cancelled"}),
                    )?;
                    return Ok(self.synthetic_result(
                        run,
                        pack,
                        model_name,
                        "cancelled",
                        json!({"steps": step}),
                    ));
                }
                ModelCallOutcome::Incapable(model) => {
                    self.repo.append_event(
                        &run.run_id,
                        EventKind::Error,
                        Some(step_label.as_str()),
                        json!({"reason": "model_incapable", "model": model}),
                    )?;
                    return Ok(self.synthetic_result(
                        run,
                        pack,
                        model_name,
                        "model_incapable",
                        json!({"steps": step}),
                    ));
                }
                ModelCallOutcome::Failed(err) => {
                    return Err(TaskError::Llm(err));
                }
            };

            for event in self.chat.pop_fallback_events() {
                self.repo.append_event(
                    &run.run_id,
                    EventKind::CloudFallback,
                    Some(step_label.as_str()),
                    serde_json::to_value(&event).unwrap_or_default(),
                )?;
            }

            self.repo.append_event(
                &run.run_id,
                EventKind::LlmResponse,
                Some(step_label.as_str()),
                json!({
                    "content": response
                        .content
                        .as_deref()
                        .map(|c| truncate_chars(c, MAX_LLM_CONTENT_IN_RUNLOG_CHARS)),
                    "tool_calls": response
                        .tool_calls
                        .iter()
                        .map(|tc| json!({"call_id": tc.call_id.as_str(), "tool": tc.tool_name.as_str()}))
                        .collect::<Vec<_>>(),
                }),
            )?;

            messages.push(assistant_message(&response));

            if response.is_empty() {
                empty_streak += 1;
                if empty_streak >= MAX_EMPTY_RESPONSES {
                    self.repo.append_event(
                        &run.run_id,
                        EventKind::Error,
                        Some(step_label.as_str()),
                        json!({"reason": "empty_responses", "consecutive": empty_streak}),
                    )?;
                    return Ok(self.synthetic_result(
                        run,
                        pack,
                        model_name,
                        "empty_responses",
                        json!({"steps": step + 1}),
                    ));
                }
                messages.push(ChatMessage::user(EMPTY_RESPONSE_NUDGE));
                continue;
            }
            empty_streak = 0;

            if let Some(content) = &response.content {
                if !content.trim().is_empty() {
                    last_content = Some(content.clone());
                }
            }

            for tc in &response.tool_calls {
                if tc.tool_name == finish_tool {
                    match check_finish_payload(&required_fields, pack, &tc.arguments) {
                        Ok(payload) => {
                            self.repo.append_event(
                                &run.run_id,
                                EventKind::Finish,
                                Some(step_label.as_str()),
                                serde_json::Value::Object(payload.clone()),
                            )?;
                            debug!(step, "finish_task accepted, run complete");
                            return Ok(RunResult {
                                run_id: run.run_id.clone(),
                                specialist_id: pack.specialist_id().to_string(),
                                run_dir: run.run_dir.clone(),
                                workspace_path: run.workspace_path.clone(),
                                model_name: model_name.to_string(),
                                payload,
                            });
                        }
                        Err(error_text) => {
                            validation_failures += 1;
                            warn!(step, error = %error_text, "finish_task rejected");
                            self.repo.append_event(
                                &run.run_id,
                                EventKind::ToolResult,
                                Some(step_label.as_str()),
                                json!({
                                    "call_id": tc.call_id.as_str(),
                                    "tool": finish_tool.as_str(),
                                    "error": error_text.clone(),
                                }),
                            )?;
                            messages.push(ChatMessage::tool(error_text, &tc.call_id));
                            if validation_failures >= MAX_VALIDATION_FAILURES {
                                self.repo.append_event(
                                    &run.run_id,
                                    EventKind::Error,
                                    Some(step_label.as_str()),
                                    json!({
                                        "reason": "validation_failures",
                                        "attempts": validation_failures,
                                    }),
                                )?;
                                return Ok(self.synthetic_result(
                                    run,
                                    pack,
                                    model_name,
                                    "validation_failures",
                                    json!({"attempts": validation_failures, "steps": step + 1}),
                                ));
                            }
                            continue;
                        }
                    }
                }

                self.repo.append_event(
                    &run.run_id,
                    EventKind::ToolCall,
                    Some(step_label.as_str()),
                    json!({
                        "call_id": tc.call_id.as_str(),
                        "tool": tc.tool_name.as_str(),
                        "args": tc.arguments.clone(),
                    }),
                )?;

                let (event_payload, message_content) =
                    match pack.execute_tool(&tc.tool_name, tc.arguments.clone()).await {
                        Ok(result) => {
                            let content = serde_json::to_string(&result)
                                .unwrap_or_else(|_| "{}".to_string());
                            let logged = log_safe(result);
                            (
                                json!({
                                    "call_id": tc.call_id.as_str(),
                                    "tool": tc.tool_name.as_str(),
                                    "result": logged,
                                }),
                                content,
                            )
                        }
                        Err(err) => {
                            let error_text = err.to_string();
                            warn!(tool = %tc.tool_name, error = %error_text, "tool failed");
                            (
                                json!({
                                    "call_id": tc.call_id.as_str(),
                                    "tool": tc.tool_name.as_str(),
                                    "error": error_text.clone(),
                                }),
                                json!({"error": error_text}).to_string(),
                            )
                        }
                    };

                self.repo.append_event(
                    &run.run_id,
                    EventKind::ToolResult,
                    Some(step_label.as_str()),
                    event_payload,
                )?;
                messages.push(ChatMessage::tool(message_content, &tc.call_id));
            }
        }

        self.repo.append_event(
            &run.run_id,
            EventKind::Error,
            None,
            json!({"reason": "step_budget", "max_steps": self.max_steps}),
        )?;
        Ok(self.synthetic_result(
            run,
            pack,
            model_name,
            "step_budget",
            json!({"last_content": last_content, "steps": self.max_steps}),
        ))
    }

    async fn call_model(&self, request: &ChatRequest) -> ModelCallOutcome {
        let outcome = match &self.cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return ModelCallOutcome::Cancelled;
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return ModelCallOutcome::Cancelled,
                    result = self.chat.chat(request) => result,
                }
            }
            None => self.chat.chat(request).await,
        };
        match outcome {
            Ok(response) => ModelCallOutcome::Response(response),
            Err(ProviderError::ModelLacksTools(model)) => ModelCallOutcome::Incapable(model),
            Err(err) => ModelCallOutcome::Failed(err),
        }
    }

    fn synthetic_result(
        &self,
        run: &RunHandle,
        pack: &dyn SpecialistPack,
        model_name: &str,
        terminated_by: &str,
        extras: serde_json::Value,
    ) -> RunResult {
        let mut payload = serde_json::Map::new();
        payload.insert("terminated_by".into(), terminated_by.into());
        if let serde_json::Value::Object(extras) = extras {
            payload.extend(extras);
        }
        RunResult {
            run_id: run.run_id.clone(),
            specialist_id: pack.specialist_id().to_string(),
            run_dir: run.run_dir.clone(),
            workspace_path: run.workspace_path.clone(),
            model_name: model_name.to_string(),
            payload,
        }
    }
}

enum ModelCallOutcome {
    Response(fabric_llm::LlmResponse),
    Cancelled,
    Incapable(String),
    Failed(ProviderError),
}

/// Rebuild the assistant message (content plus tool calls) for the
/// conversation, so the next request sees the sequence
/// `assistant (tool_calls) -> tool results` the protocol expects.
fn assistant_message(response: &fabric_llm::LlmResponse) -> ChatMessage {
    let tool_calls = if response.has_tool_calls() {
        Some(
            response
                .tool_calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc.call_id.clone(),
                    call_type: "function".into(),
                    function: FunctionCall {
                        name: tc.tool_name.clone(),
                        arguments: serde_json::to_string(&tc.arguments)
                            .unwrap_or_else(|_| "{}".into()),
                    },
                })
                .collect(),
        )
    } else {
        None
    };
    ChatMessage {
        role: "assistant".into(),
        content: response.content.clone().unwrap_or_default(),
        tool_call_id: None,
        tool_calls,
    }
}

/// Generic finish validation: required fields first, then the pack's
/// quality gate. Returns the validated payload object, or the error text
/// to feed back to the model.
fn check_finish_payload(
    required_fields: &[String],
    pack: &dyn SpecialistPack,
    args: &serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let object = match args.as_object() {
        Some(object) if !object.contains_key("_raw") => object,
        _ => {
            return Err(format!(
                "finish_task arguments must be a JSON object with fields: {}",
                required_fields.join(", ")
            ));
        }
    };

    let missing: Vec<&str> = required_fields
        .iter()
        .filter(|field| !object.contains_key(field.as_str()))
        .map(|field| field.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "finish_task rejected: missing required fields: {}",
            missing.join(", ")
        ));
    }

    if let Some(error) = pack.validate_finish_payload(args) {
        return Err(format!("finish_task rejected: {error}"));
    }

    Ok(object.clone())
}

/// Cap a string at `limit` characters for the run log.
fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    s.chars().take(limit).collect()
}

/// Make a tool result safe to store in the run log: oversized results are
/// replaced by a truncated string with a marker.
fn log_safe(value: serde_json::Value) -> serde_json::Value {
    let serialized = value.to_string();
    if serialized.chars().count() <= MAX_TOOL_OUTPUT_CHARS {
        return value;
    }
    let over = serialized.chars().count() - MAX_TOOL_OUTPUT_CHARS;
    let truncated: String = serialized.chars().take(MAX_TOOL_OUTPUT_CHARS).collect();
    serde_json::Value::String(format!("{truncated}\n... [truncated {over} chars]"))
}
