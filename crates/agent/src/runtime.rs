use std::sync::Arc;

use planner_core::config::{AppConfig, ConfigError};
use planner_core::{
    Orchestrator, PipelineError, PipelineInput, ProjectPlan, StageCatalog, StageConfigError,
};
use thiserror::Error;
use tracing::info;

use crate::executor::{LlmStageExecutor, UsageMetrics};
use crate::llm::{LlmClient, LlmError};
use crate::openai::OpenAiCompatibleClient;
use crate::prompt::PromptRenderer;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stages(#[from] StageConfigError),
    #[error(transparent)]
    Client(#[from] LlmError),
}

/// Everything needed to plan projects against one configured model.
pub struct PlannerRuntime<C = OpenAiCompatibleClient> {
    orchestrator: Orchestrator<Arc<LlmStageExecutor<C>>>,
    executor: Arc<LlmStageExecutor<C>>,
    cost_per_million_tokens: f64,
}

impl PlannerRuntime<OpenAiCompatibleClient> {
    pub fn from_config(config: &AppConfig) -> Result<Self, RuntimeError> {
        let client = OpenAiCompatibleClient::new(&config.llm)?;
        Self::with_client(config, client)
    }
}

impl<C> PlannerRuntime<C>
where
    C: LlmClient,
{
    pub fn with_client(config: &AppConfig, client: C) -> Result<Self, RuntimeError> {
        config.validate()?;
        let catalog = StageCatalog::resolve(config.pipeline.stages_path.as_deref())?;
        let prompts = PromptRenderer::new(&catalog)?;
        let executor = Arc::new(LlmStageExecutor::new(client, prompts, config.llm.temperature));

        info!(
            event_name = "planner.runtime.ready",
            provider = ?config.llm.provider,
            model = %config.llm.model,
            base_url = %config.llm.base_url,
            custom_stages = config.pipeline.stages_path.is_some(),
            "planner runtime ready"
        );

        Ok(Self {
            orchestrator: Orchestrator::new(catalog, Arc::clone(&executor)),
            executor,
            cost_per_million_tokens: config.usage.cost_per_million_tokens,
        })
    }

    pub async fn plan_project(&self, input: PipelineInput) -> Result<ProjectPlan, PipelineError> {
        let plan = self.orchestrator.run(input).await?;

        let usage = self.usage_metrics();
        info!(
            event_name = "planner.usage.updated",
            total_tokens = usage.total_tokens,
            successful_requests = usage.successful_requests,
            estimated_cost = self.estimated_cost(),
            "token usage after planning run"
        );
        Ok(plan)
    }

    /// Totals since the runtime was built, across every run.
    pub fn usage_metrics(&self) -> UsageMetrics {
        self.executor.usage_metrics()
    }

    pub fn estimated_cost(&self) -> f64 {
        self.usage_metrics().estimated_cost(self.cost_per_million_tokens)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use planner_core::config::AppConfig;
    use planner_core::stages::StageConfigError;
    use planner_core::{PipelineError, PipelineInput, StageId};
    use tempfile::TempDir;

    use super::{PlannerRuntime, RuntimeError};
    use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, TokenUsage};

    const PLAN: &str = r#"{"tasks": [{"task_name": "Wireframes", "estimated_time_hours": "8h",
        "required_resources": ["Designer"]}], "milestones": [{"milestone_name": "Design done",
        "tasks": ["Wireframes"]}]}"#;

    struct FixedClient;

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
            let content = if request.json_mode { PLAN } else { "Wireframes, 8 hours" };
            Ok(Completion {
                content: content.to_string(),
                usage: Some(TokenUsage {
                    prompt_tokens: 900,
                    completion_tokens: 100,
                    total_tokens: 1_000,
                }),
            })
        }
    }

    fn input() -> PipelineInput {
        PipelineInput::new("Mobile app", "Fitness", "Track workouts", "Dana (Designer)", "iOS")
    }

    #[tokio::test]
    async fn plan_project_reports_usage_and_cost() -> anyhow::Result<()> {
        let mut config = AppConfig::default();
        config.usage.cost_per_million_tokens = 2.0;
        let runtime = PlannerRuntime::with_client(&config, FixedClient)?;

        let plan = runtime.plan_project(input()).await?;

        assert_eq!(plan.tasks[0].estimated_time_hours, 8.0);
        assert_eq!(plan.resource_hours().get("Designer"), Some(&8.0));
        assert_eq!(runtime.usage_metrics().total_tokens, 3_000);
        assert_eq!(runtime.usage_metrics().successful_requests, 3);
        assert!((runtime.estimated_cost() - 0.006).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_input_makes_no_model_calls() {
        let runtime =
            PlannerRuntime::with_client(&AppConfig::default(), FixedClient).expect("runtime");
        let mut input = input();
        input.industry.clear();

        let error = runtime.plan_project(input).await.expect_err("industry is required");

        assert!(matches!(error, PipelineError::Validation(_)));
        assert_eq!(runtime.usage_metrics().successful_requests, 0);
    }

    #[test]
    fn custom_stage_file_with_unknown_placeholder_is_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("stages.toml");
        let builtin = include_str!("../../core/config/stages.toml");
        fs::write(&path, builtin.replace("{{ team_members }}", "{{ headcount }}"))?;

        let mut config = AppConfig::default();
        config.pipeline.stages_path = Some(path);

        match PlannerRuntime::with_client(&config, FixedClient) {
            Err(RuntimeError::Stages(StageConfigError::InvalidTemplate { stage, reason })) => {
                assert_eq!(stage, StageId::Breakdown);
                assert!(reason.contains("headcount"));
            }
            Err(other) => anyhow::bail!("expected template error, got {other}"),
            Ok(_) => anyhow::bail!("runtime must not build"),
        }
        Ok(())
    }

    #[test]
    fn missing_stage_file_fails_config_validation() {
        let mut config = AppConfig::default();
        config.pipeline.stages_path = Some(PathBuf::from("no/such/stages.toml"));

        assert!(matches!(
            PlannerRuntime::with_client(&config, FixedClient),
            Err(RuntimeError::Config(_))
        ));
    }
}
