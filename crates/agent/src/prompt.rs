use std::error::Error as _;

use planner_core::pipeline::StageRequest;
use planner_core::stages::{OutputSchema, StageCatalog, StageConfigError, StageDefinition, StageId};
use planner_core::PipelineInput;
use tera::{Context, Tera};

use crate::llm::ChatMessage;

const PROJECT_PLAN_SHAPE: &str = r#"Respond with a single JSON object and nothing else, using exactly this shape:
{
  "tasks": [
    {
      "task_name": "string",
      "estimated_time_hours": 0.0,
      "required_resources": ["string"]
    }
  ],
  "milestones": [
    {
      "milestone_name": "string",
      "tasks": ["task_name of a task listed above"]
    }
  ]
}"#;

const FIELDS: [&str; 5] = ["role", "goal", "backstory", "instructions", "expected_output"];

/// Compiled prompt templates for every stage of a catalog.
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    /// Compiles every template and dry-renders it, so syntax errors and
    /// unknown placeholders fail here rather than mid-run.
    pub fn new(catalog: &StageCatalog) -> Result<Self, StageConfigError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());

        for definition in catalog.iter() {
            for (field, source) in template_sources(definition) {
                tera.add_raw_template(&template_name(definition.id, field), source)
                    .map_err(|error| invalid_template(definition.id, &error))?;
            }
        }

        let renderer = Self { tera };
        let sample = PipelineInput::new(
            "sample project",
            "sample industry",
            "sample objectives",
            "sample team",
            "sample requirements",
        );
        let context = template_context(&sample);
        for definition in catalog.iter() {
            for field in FIELDS {
                renderer
                    .tera
                    .render(&template_name(definition.id, field), &context)
                    .map_err(|error| invalid_template(definition.id, &error))?;
            }
        }

        Ok(renderer)
    }

    /// System message from the persona, user message from the task, every run
    /// input and the prior stage outputs.
    pub fn render(&self, request: &StageRequest<'_>) -> Result<Vec<ChatMessage>, String> {
        let stage = request.stage();
        let context = template_context(request.context.inputs());
        let field = |name: &str| {
            self.tera
                .render(&template_name(stage, name), &context)
                .map(|rendered| rendered.trim().to_string())
                .map_err(|error| error_chain(&error))
        };

        let system = format!(
            "You are {}.\n\n{}\n\nYour personal goal is: {}",
            field("role")?,
            field("backstory")?,
            field("goal")?
        );

        let mut user = field("instructions")?;
        user.push_str("\n\nProject details:\n");
        user.push_str(&request.context.render_inputs());
        let prior = request.context.render_prior_outputs();
        if !prior.is_empty() {
            user.push_str("\n\nContext from earlier stages:\n\n");
            user.push_str(&prior);
        }
        user.push_str("\n\nExpected output:\n");
        user.push_str(&field("expected_output")?);
        if let Some(schema) = request.definition.output_schema {
            user.push_str("\n\n");
            user.push_str(shape_description(schema));
        }

        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }
}

pub fn shape_description(schema: OutputSchema) -> &'static str {
    match schema {
        OutputSchema::ProjectPlan => PROJECT_PLAN_SHAPE,
    }
}

fn template_sources(definition: &StageDefinition) -> [(&'static str, &str); 5] {
    [
        ("role", definition.persona.role.as_str()),
        ("goal", definition.persona.goal.as_str()),
        ("backstory", definition.persona.backstory.as_str()),
        ("instructions", definition.instructions.as_str()),
        ("expected_output", definition.expected_output.as_str()),
    ]
}

fn template_name(stage: StageId, field: &str) -> String {
    format!("{stage}.{field}")
}

fn template_context(input: &PipelineInput) -> Context {
    let mut context = Context::new();
    for (name, value) in input.fields() {
        context.insert(name, value.trim());
    }
    context
}

fn invalid_template(stage: StageId, error: &tera::Error) -> StageConfigError {
    StageConfigError::InvalidTemplate { stage, reason: error_chain(error) }
}

/// Tera keeps the useful detail in the source chain.
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
