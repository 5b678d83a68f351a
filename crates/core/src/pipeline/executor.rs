use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::PipelineContext;
use crate::stages::{StageDefinition, StageId};

/// What a stage executor sees for one stage of one run.
#[derive(Clone, Copy, Debug)]
pub struct StageRequest<'a> {
    pub run_id: Uuid,
    pub definition: &'a StageDefinition,
    pub context: &'a PipelineContext,
}

impl StageRequest<'_> {
    pub fn stage(&self) -> StageId {
        self.definition.id
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageResponse {
    Text(String),
    Structured(Value),
}

impl StageResponse {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Structured(value) => value.is_null(),
        }
    }

    /// Text form used when the response is threaded into later stages.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(value) => value.to_string(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("prompt could not be rendered: {0}")]
    Prompt(String),
}

/// Runs one stage against a language model. Retry and timeout policy belong
/// to the implementation; the orchestrator calls each stage exactly once.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, request: StageRequest<'_>) -> Result<StageResponse, ExecutorError>;
}

#[async_trait]
impl<T> StageExecutor for Arc<T>
where
    T: StageExecutor + ?Sized,
{
    async fn execute(&self, request: StageRequest<'_>) -> Result<StageResponse, ExecutorError> {
        (**self).execute(request).await
    }
}
