//! Model-backed execution for the project planner.
//!
//! `planner-core` decides what runs and validates what comes back; this crate
//! talks to the model:
//! - `llm` - the `LlmClient` seam and chat message types
//! - `openai` - OpenAI-compatible HTTP client (OpenAI, Ollama) with retry
//! - `prompt` - tera rendering of stage personas and instructions
//! - `executor` - `LlmStageExecutor`, the `StageExecutor` the orchestrator drives,
//!   plus token usage accounting
//! - `runtime` - `PlannerRuntime`, wiring config, catalog, client and orchestrator
//! - `telemetry` - tracing subscriber setup
//!
//! The model only writes prose and the final JSON. Stage order, context
//! threading and plan validation stay deterministic in the core.

pub mod executor;
pub mod llm;
pub mod openai;
pub mod prompt;
pub mod runtime;
pub mod telemetry;

pub use executor::{LlmStageExecutor, UsageMetrics};
pub use llm::{ChatMessage, Completion, CompletionRequest, LlmClient, LlmError, Role, TokenUsage};
pub use openai::OpenAiCompatibleClient;
pub use prompt::PromptRenderer;
pub use runtime::{PlannerRuntime, RuntimeError};
