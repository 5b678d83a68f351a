use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::stages::StageId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEventKind {
    Started,
    Completed,
    Failed,
}

impl StageEventKind {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Started => "pipeline.stage.started",
            Self::Completed => "pipeline.stage.completed",
            Self::Failed => "pipeline.stage.failed",
        }
    }
}

/// Progress notification for one stage of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_id: String,
    pub run_id: Uuid,
    pub kind: StageEventKind,
    pub stage: StageId,
    pub position: usize,
    pub total_stages: usize,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(run_id: Uuid, kind: StageEventKind, stage: StageId) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            run_id,
            kind,
            stage,
            position: stage.position(),
            total_stages: StageId::ALL.len(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("observer failed: {0}")]
pub struct ObserverError(pub String);

/// Advisory sink for progress notifications. A failing observer never fails
/// the run that notified it.
pub trait PipelineObserver: Send + Sync {
    fn notify(&self, event: &PipelineEvent) -> Result<(), ObserverError>;
}

impl<T> PipelineObserver for Arc<T>
where
    T: PipelineObserver + ?Sized,
{
    fn notify(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        (**self).notify(event)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn notify(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        tracing::info!(
            event_name = event.kind.event_name(),
            run_id = %event.run_id,
            stage = event.stage.as_str(),
            position = event.position,
            total_stages = event.total_stages,
            "stage {}/{} {}: {}",
            event.position,
            event.total_stages,
            match event.kind {
                StageEventKind::Started => "started",
                StageEventKind::Completed => "completed",
                StageEventKind::Failed => "failed",
            },
            event.stage
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryObserver {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl InMemoryObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PipelineObserver for InMemoryObserver {
    fn notify(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{InMemoryObserver, PipelineEvent, PipelineObserver, StageEventKind};
    use crate::stages::StageId;

    #[test]
    fn in_memory_observer_records_stage_position() {
        let observer = InMemoryObserver::default();
        let run_id = Uuid::new_v4();

        observer
            .notify(
                &PipelineEvent::new(run_id, StageEventKind::Completed, StageId::Estimation)
                    .with_metadata("elapsed_ms", "1200"),
            )
            .expect("in-memory observer never fails");

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, run_id);
        assert_eq!(events[0].position, 2);
        assert_eq!(events[0].total_stages, 3);
        assert_eq!(events[0].kind.event_name(), "pipeline.stage.completed");
        assert_eq!(events[0].metadata.get("elapsed_ms").map(String::as_str), Some("1200"));
    }
}
