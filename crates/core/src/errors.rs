use thiserror::Error;

use crate::domain::InputValidationError;
use crate::pipeline::ExecutorError;
use crate::schema::SchemaValidationError;
use crate::stages::{StageConfigError, StageId};

/// First unrecoverable failure of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline input: {0}")]
    Validation(#[from] InputValidationError),
    #[error("stage configuration failure: {0}")]
    Configuration(#[from] StageConfigError),
    #[error("stage `{stage}` execution failed: {source}")]
    Execution {
        stage: StageId,
        #[source]
        source: ExecutorError,
    },
    #[error("stage `{stage}` output failed schema validation: {source}")]
    SchemaValidation {
        stage: StageId,
        #[source]
        source: SchemaValidationError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Execution,
    SchemaValidation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Execution => "execution",
            Self::SchemaValidation => "schema_validation",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Validation => "Some project details are missing. Fill in every field and try again.",
            Self::Configuration => "The planner is misconfigured. Check the stage definitions.",
            Self::Execution => "The language model could not complete the plan. Please retry shortly.",
            Self::SchemaValidation => {
                "The language model returned a plan in an unexpected format. Please retry."
            }
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::SchemaValidation { .. } => ErrorKind::SchemaValidation,
        }
    }

    /// Stage the run aborted at, when a stage was reached.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Execution { stage, .. } | Self::SchemaValidation { stage, .. } => Some(*stage),
            Self::Configuration(StageConfigError::MissingStage(stage))
            | Self::Configuration(StageConfigError::Malformed { stage, .. })
            | Self::Configuration(StageConfigError::InvalidTemplate { stage, .. }) => Some(*stage),
            Self::Validation(_) | Self::Configuration(_) => None,
        }
    }

    /// Schema failures terminate a run the same way execution failures do.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::SchemaValidation { .. })
    }
}
