//! Core of the project planner: a three-stage pipeline (breakdown,
//! estimation, allocation) that turns a free-text project description into a
//! schema-validated [`ProjectPlan`].
//!
//! The language model itself sits behind [`pipeline::StageExecutor`]; this
//! crate owns sequencing, context threading, stage definitions and the
//! validation boundary.

pub mod config;
pub mod domain;
pub mod errors;
pub mod observer;
pub mod pipeline;
pub mod schema;
pub mod stages;

pub use domain::{
    DanglingReference, InputValidationError, Milestone, PipelineInput, ProjectPlan, TaskEstimate,
};
pub use errors::{ErrorKind, PipelineError};
pub use observer::{
    InMemoryObserver, ObserverError, PipelineEvent, PipelineObserver, StageEventKind,
    TracingObserver,
};
pub use pipeline::{
    ExecutorError, Orchestrator, PipelineContext, StageExecutor, StageOutput, StageRequest,
    StageResponse,
};
pub use schema::SchemaValidationError;
pub use stages::{OutputSchema, Persona, StageCatalog, StageConfigError, StageDefinition, StageId};
