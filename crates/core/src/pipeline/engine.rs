use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PipelineInput, ProjectPlan};
use crate::errors::PipelineError;
use crate::observer::{PipelineEvent, PipelineObserver, StageEventKind, TracingObserver};
use crate::pipeline::{ExecutorError, PipelineContext, StageExecutor, StageRequest, StageResponse};
use crate::schema;
use crate::stages::{OutputSchema, StageCatalog, StageConfigError, StageDefinition, StageId};

/// Runs breakdown, estimation and allocation in order, threading each stage's
/// output forward and validating the final answer into a [`ProjectPlan`].
pub struct Orchestrator<E, O = TracingObserver> {
    catalog: StageCatalog,
    executor: E,
    observer: O,
}

impl<E> Orchestrator<E, TracingObserver>
where
    E: StageExecutor,
{
    pub fn new(catalog: StageCatalog, executor: E) -> Self {
        Self::with_observer(catalog, executor, TracingObserver)
    }
}

impl<E, O> Orchestrator<E, O>
where
    E: StageExecutor,
    O: PipelineObserver,
{
    pub fn with_observer(catalog: StageCatalog, executor: E, observer: O) -> Self {
        Self { catalog, executor, observer }
    }

    pub async fn run(&self, input: PipelineInput) -> Result<ProjectPlan, PipelineError> {
        input.validate()?;
        let [breakdown, estimation, allocation] = self.resolve_definitions()?;
        let schema = allocation.output_schema.ok_or_else(|| StageConfigError::Malformed {
            stage: allocation.id,
            reason: "`output_schema` is required on the final stage".to_string(),
        })?;

        let run_id = Uuid::new_v4();
        info!(
            event_name = "pipeline.run.started",
            run_id = %run_id,
            project_type = %input.project_type,
            industry = %input.industry,
            "starting project planning run"
        );

        let mut context = PipelineContext::new(input);
        for definition in [breakdown, estimation] {
            let started = Instant::now();
            let response = self.execute_stage(run_id, definition, &context).await?;
            context.append(definition.id, response.into_text());
            self.stage_completed(run_id, definition.id, started);
        }

        let started = Instant::now();
        let response = self.execute_stage(run_id, allocation, &context).await?;
        let plan = self.validate_final(run_id, allocation.id, &response, schema)?;
        self.stage_completed(run_id, allocation.id, started);

        for dangling in plan.dangling_task_references() {
            warn!(
                event_name = "pipeline.plan.dangling_reference",
                run_id = %run_id,
                milestone = %dangling.milestone_name,
                task = %dangling.task_name,
                "milestone references a task that is not in the plan"
            );
        }

        info!(
            event_name = "pipeline.run.completed",
            run_id = %run_id,
            tasks = plan.tasks.len(),
            milestones = plan.milestones.len(),
            total_hours = plan.total_estimated_hours(),
            "project planning run completed"
        );
        Ok(plan)
    }

    fn resolve_definitions(&self) -> Result<[&StageDefinition; 3], StageConfigError> {
        Ok([
            self.catalog.lookup(StageId::Breakdown)?,
            self.catalog.lookup(StageId::Estimation)?,
            self.catalog.lookup(StageId::Allocation)?,
        ])
    }

    async fn execute_stage(
        &self,
        run_id: Uuid,
        definition: &StageDefinition,
        context: &PipelineContext,
    ) -> Result<StageResponse, PipelineError> {
        let stage = definition.id;
        self.notify(PipelineEvent::new(run_id, StageEventKind::Started, stage));

        let result = self
            .executor
            .execute(StageRequest { run_id, definition, context })
            .await
            .and_then(|response| {
                if response.is_blank() {
                    Err(ExecutorError::EmptyResponse)
                } else {
                    Ok(response)
                }
            });

        result.map_err(|source| {
            self.stage_failed(run_id, stage, &source.to_string());
            PipelineError::Execution { stage, source }
        })
    }

    fn validate_final(
        &self,
        run_id: Uuid,
        stage: StageId,
        response: &StageResponse,
        schema: OutputSchema,
    ) -> Result<ProjectPlan, PipelineError> {
        schema::validate_response(response, schema).map_err(|source| {
            self.stage_failed(run_id, stage, &source.to_string());
            PipelineError::SchemaValidation { stage, source }
        })
    }

    fn stage_completed(&self, run_id: Uuid, stage: StageId, started: Instant) {
        self.notify(
            PipelineEvent::new(run_id, StageEventKind::Completed, stage)
                .with_metadata("elapsed_ms", started.elapsed().as_millis().to_string()),
        );
    }

    fn stage_failed(&self, run_id: Uuid, stage: StageId, error: &str) {
        warn!(
            event_name = "pipeline.run.aborted",
            run_id = %run_id,
            stage = stage.as_str(),
            error = %error,
            "project planning run aborted"
        );
        self.notify(
            PipelineEvent::new(run_id, StageEventKind::Failed, stage).with_metadata("error", error),
        );
    }

    fn notify(&self, event: PipelineEvent) {
        if let Err(error) = self.observer.notify(&event) {
            warn!(
                event_name = "pipeline.observer.failed",
                run_id = %event.run_id,
                stage = event.stage.as_str(),
                error = %error,
                "pipeline observer rejected a progress notification"
            );
        }
    }
}
