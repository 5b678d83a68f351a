use std::sync::Mutex;

use async_trait::async_trait;
use planner_core::pipeline::{ExecutorError, StageExecutor, StageRequest, StageResponse};
use planner_core::schema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{CompletionRequest, LlmClient, LlmError, TokenUsage};
use crate::prompt::PromptRenderer;

/// Token counters accumulated over every successful model call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub successful_requests: u64,
}

impl UsageMetrics {
    pub fn record(&mut self, usage: Option<TokenUsage>) {
        self.successful_requests += 1;
        if let Some(usage) = usage {
            self.prompt_tokens += usage.prompt_tokens;
            self.completion_tokens += usage.completion_tokens;
            self.total_tokens += usage.total();
        }
    }

    pub fn estimated_cost(&self, cost_per_million_tokens: f64) -> f64 {
        cost_per_million_tokens * self.total_tokens as f64 / 1_000_000.0
    }
}

/// [`StageExecutor`] that renders the stage prompt and sends it to a chat
/// model.
pub struct LlmStageExecutor<C> {
    client: C,
    prompts: PromptRenderer,
    temperature: Option<f32>,
    usage: Mutex<UsageMetrics>,
}

impl<C> LlmStageExecutor<C>
where
    C: LlmClient,
{
    pub fn new(client: C, prompts: PromptRenderer, temperature: Option<f32>) -> Self {
        Self { client, prompts, temperature, usage: Mutex::new(UsageMetrics::default()) }
    }

    pub fn usage_metrics(&self) -> UsageMetrics {
        match self.usage.lock() {
            Ok(usage) => *usage,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn record_usage(&self, usage: Option<TokenUsage>) {
        match self.usage.lock() {
            Ok(mut metrics) => metrics.record(usage),
            Err(poisoned) => poisoned.into_inner().record(usage),
        }
    }
}

#[async_trait]
impl<C> StageExecutor for LlmStageExecutor<C>
where
    C: LlmClient,
{
    async fn execute(&self, request: StageRequest<'_>) -> Result<StageResponse, ExecutorError> {
        let stage = request.stage();
        let messages = self.prompts.render(&request).map_err(ExecutorError::Prompt)?;
        let schema = request.definition.output_schema;

        debug!(
            event_name = "llm.stage.prompt_rendered",
            run_id = %request.run_id,
            stage = stage.as_str(),
            prompt_chars = messages.iter().map(|message| message.content.len()).sum::<usize>(),
            "stage prompt rendered"
        );

        let completion = self
            .client
            .complete(&CompletionRequest {
                messages,
                temperature: self.temperature,
                json_mode: schema.is_some(),
            })
            .await
            .map_err(executor_error)?;
        self.record_usage(completion.usage);

        let usage = completion.usage.unwrap_or_default();
        info!(
            event_name = "llm.stage.completed",
            run_id = %request.run_id,
            stage = stage.as_str(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "model replied to stage"
        );

        // Unparseable replies stay text so the orchestrator reports the exact
        // schema failure.
        match schema {
            Some(_) => match schema::extract_json(&completion.content) {
                Ok(value) => Ok(StageResponse::Structured(value)),
                Err(_) => Ok(StageResponse::Text(completion.content)),
            },
            None => Ok(StageResponse::Text(completion.content)),
        }
    }
}

fn executor_error(error: LlmError) -> ExecutorError {
    match error {
        LlmError::InvalidResponse(reason) => ExecutorError::InvalidResponse(reason),
        other => ExecutorError::Transport(other.to_string()),
    }
}
