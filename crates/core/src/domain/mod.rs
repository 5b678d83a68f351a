pub mod input;
pub mod plan;

pub use input::{InputValidationError, PipelineInput};
pub use plan::{DanglingReference, Milestone, ProjectPlan, TaskEstimate};
