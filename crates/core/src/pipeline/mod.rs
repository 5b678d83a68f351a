pub mod context;
pub mod engine;
pub mod executor;

pub use context::{PipelineContext, StageOutput};
pub use engine::Orchestrator;
pub use executor::{ExecutorError, StageExecutor, StageRequest, StageResponse};
