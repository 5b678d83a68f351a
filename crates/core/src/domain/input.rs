use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five free-text fields a caller supplies for one planning run.
///
/// Every field defaults to empty on deserialization so an absent key and a
/// blank value are reported the same way by [`PipelineInput::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInput {
    pub project_type: String,
    pub industry: String,
    pub project_objectives: String,
    pub team_members: String,
    pub project_requirements: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputValidationError {
    #[error("missing required input fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl PipelineInput {
    pub fn new(
        project_type: impl Into<String>,
        industry: impl Into<String>,
        project_objectives: impl Into<String>,
        team_members: impl Into<String>,
        project_requirements: impl Into<String>,
    ) -> Self {
        Self {
            project_type: project_type.into(),
            industry: industry.into(),
            project_objectives: project_objectives.into(),
            team_members: team_members.into(),
            project_requirements: project_requirements.into(),
        }
    }

    /// `(name, value)` pairs in declaration order.
    pub fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("project_type", self.project_type.as_str()),
            ("industry", self.industry.as_str()),
            ("project_objectives", self.project_objectives.as_str()),
            ("team_members", self.team_members.as_str()),
            ("project_requirements", self.project_requirements.as_str()),
        ]
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn validate(&self) -> Result<(), InputValidationError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InputValidationError::MissingFields(missing))
        }
    }
}
