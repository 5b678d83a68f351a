use serde::{Deserialize, Serialize};

use crate::domain::PipelineInput;
use crate::stages::StageId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: StageId,
    pub text: String,
}

/// Inputs of a run plus the free-text outputs of every completed stage.
///
/// Outputs can only be appended, so a later stage always sees everything an
/// earlier stage saw, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineContext {
    inputs: PipelineInput,
    outputs: Vec<StageOutput>,
}

impl PipelineContext {
    pub fn new(inputs: PipelineInput) -> Self {
        Self { inputs, outputs: Vec::new() }
    }

    pub fn inputs(&self) -> &PipelineInput {
        &self.inputs
    }

    pub fn outputs(&self) -> &[StageOutput] {
        &self.outputs
    }

    pub fn append(&mut self, stage: StageId, text: String) {
        self.outputs.push(StageOutput { stage, text });
    }

    /// Prior stage outputs joined for inclusion in a prompt; empty for the
    /// first stage.
    pub fn render_prior_outputs(&self) -> String {
        self.outputs
            .iter()
            .map(|output| format!("Output of the {} stage:\n{}", output.stage, output.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One `name: value` line per input field.
    pub fn render_inputs(&self) -> String {
        self.inputs
            .fields()
            .into_iter()
            .map(|(name, value)| format!("{}: {}", name.replace('_', " "), value.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inputs followed by prior outputs.
    pub fn render(&self) -> String {
        let mut sections = self.render_inputs();

        let prior = self.render_prior_outputs();
        if !prior.is_empty() {
            sections.push_str("\n\n");
            sections.push_str(&prior);
        }
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineContext;
    use crate::domain::PipelineInput;
    use crate::stages::StageId;

    #[test]
    fn outputs_accumulate_in_order() {
        let mut context = PipelineContext::new(PipelineInput::new(
            "Website",
            "Retail",
            "Sell online",
            "2 developers",
            "Cart, payments",
        ));
        assert_eq!(context.render_prior_outputs(), "");

        context.append(StageId::Breakdown, "1. Design\n2. Build\n".to_string());
        context.append(StageId::Estimation, "Design: 8h".to_string());

        assert_eq!(context.outputs().len(), 2);
        assert_eq!(context.outputs()[0].stage, StageId::Breakdown);
        assert_eq!(context.outputs()[1].text, "Design: 8h");
        assert_eq!(
            context.render_prior_outputs(),
            "Output of the breakdown stage:\n1. Design\n2. Build\n\nOutput of the estimation stage:\nDesign: 8h"
        );

        assert_eq!(context.render_inputs().lines().count(), 5);
        let rendered = context.render();
        assert!(rendered.starts_with("project type: Website\nindustry: Retail"));
        assert!(rendered.ends_with("Design: 8h"));
    }
}
