//! Named constants for values that appear in more than one crate.
//!
//! Each constant documents why the value is what it is, so a change can be
//! judged without grepping for side effects.

/// Maximum characters kept from a single tool execution's stdout or stderr.
///
/// Prevents a runaway shell command (`find /`, `cat big_file`) from
/// allocating gigabytes and writing an unreadable run log. Applied to
/// stdout and stderr independently.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 50_000;

/// Maximum characters stored from an LLM response's text content in the
/// run log. The full content is always passed to the conversation; only
/// the log entry is capped to keep `runlog.jsonl` scannable.
pub const MAX_LLM_CONTENT_IN_RUNLOG_CHARS: usize = 2_000;

/// Default HTTP read timeout for a single LLM chat-completions call.
/// Conservative for small local models; quality-tier model configs raise
/// this to 360 s.
pub const LLM_CHAT_DEFAULT_TIMEOUT_S: u64 = 120;

/// Default wall-clock timeout for a single shell command inside the
/// sandbox. Covers most test runs, linters, and build steps; the model can
/// override it per call via the shell tool's `timeout_s` argument.
pub const SHELL_DEFAULT_TIMEOUT_S: u64 = 120;

/// Default step budget for one tool-loop run.
pub const DEFAULT_MAX_STEPS: u32 = 40;

/// Consecutive empty LLM responses (no content, no tool calls) tolerated
/// before the engine gives up on the run.
pub const MAX_EMPTY_RESPONSES: u32 = 3;

/// Rejected `finish_task` attempts tolerated before the engine gives up.
/// Bounds the pathological case of a model that spends its entire step
/// budget failing the same validation.
pub const MAX_VALIDATION_FAILURES: u32 = 5;
