//! Coercion of the final stage's answer into a [`ProjectPlan`].
//!
//! Language models rarely return bare JSON: reasoning blocks, markdown fences
//! and a sentence of preamble are common. Text responses are narrowed to the
//! JSON payload first, then walked field by field so errors name the exact
//! path that failed (`tasks[2].estimated_time_hours`).

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Milestone, ProjectPlan, TaskEstimate};
use crate::pipeline::StageResponse;
use crate::stages::OutputSchema;

const ROOT_PATH: &str = "$";
const HOUR_SUFFIXES: [&str; 5] = ["hours", "hour", "hrs", "hr", "h"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaValidationError {
    #[error("no JSON object found in response")]
    NoJsonObject,
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{path}` must be {expected}, found {found}")]
    WrongType { path: String, expected: &'static str, found: &'static str },
    #[error("field `{path}` must be a non-negative number, found `{value}`")]
    InvalidNumber { path: String, value: String },
    #[error("field `{path}` must contain only text, found {found}")]
    NonTextElement { path: String, found: &'static str },
    #[error("field `{0}` must not be empty")]
    EmptyText(String),
}

impl SchemaValidationError {
    /// Path of the offending field, when the failure is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NoJsonObject | Self::InvalidJson(_) => None,
            Self::MissingField(path) | Self::EmptyText(path) => Some(path),
            Self::WrongType { path, .. }
            | Self::InvalidNumber { path, .. }
            | Self::NonTextElement { path, .. } => Some(path),
        }
    }
}

pub fn validate_response(
    response: &StageResponse,
    schema: OutputSchema,
) -> Result<ProjectPlan, SchemaValidationError> {
    match response {
        StageResponse::Structured(value) => validate_value(value, schema),
        StageResponse::Text(text) => validate_value(&extract_json(text)?, schema),
    }
}

pub fn validate_value(
    value: &Value,
    schema: OutputSchema,
) -> Result<ProjectPlan, SchemaValidationError> {
    match schema {
        OutputSchema::ProjectPlan => project_plan(value),
    }
}

/// Pulls the JSON object out of free-form model output.
pub fn extract_json(text: &str) -> Result<Value, SchemaValidationError> {
    let stripped = strip_reasoning(text);
    match fenced_object(&stripped) {
        Some(block) => serde_json::from_str(block)
            .map_err(|error| SchemaValidationError::InvalidJson(error.to_string())),
        None => first_embedded_object(&stripped),
    }
}

fn strip_reasoning(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        output.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    output.push_str(rest);
    output
}

fn fenced_object(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = after_fence.find('\n').map(|index| index + 1)?;
        let body = &after_fence[body_start..];
        let close = body.find("```")?;
        let block = body[..close].trim();
        if block.starts_with('{') {
            return Some(block);
        }
        rest = &body[close + 3..];
    }
    None
}

/// Tries every `{` left to right and keeps the first one that opens a
/// complete JSON object, so braces in surrounding prose are skipped.
fn first_embedded_object(text: &str) -> Result<Value, SchemaValidationError> {
    let mut first_error = None;
    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if value.is_object() => return Ok(value),
            Some(Err(error)) => {
                first_error.get_or_insert_with(|| error.to_string());
            }
            _ => {}
        }
    }

    Err(match first_error {
        Some(reason) => SchemaValidationError::InvalidJson(reason),
        None => SchemaValidationError::NoJsonObject,
    })
}

fn project_plan(value: &Value) -> Result<ProjectPlan, SchemaValidationError> {
    let root = as_object(value, ROOT_PATH)?;

    let tasks = required_array(root, "tasks", "")?
        .iter()
        .enumerate()
        .map(|(index, item)| task_estimate(item, &format!("tasks[{index}]")))
        .collect::<Result<Vec<_>, _>>()?;

    let milestones = required_array(root, "milestones", "")?
        .iter()
        .enumerate()
        .map(|(index, item)| milestone(item, &format!("milestones[{index}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProjectPlan::new(tasks, milestones))
}

fn task_estimate(value: &Value, path: &str) -> Result<TaskEstimate, SchemaValidationError> {
    let object = as_object(value, path)?;
    Ok(TaskEstimate {
        task_name: required_text(object, "task_name", path)?,
        estimated_time_hours: required_hours(object, "estimated_time_hours", path)?,
        required_resources: required_text_list(object, "required_resources", path)?,
    })
}

fn milestone(value: &Value, path: &str) -> Result<Milestone, SchemaValidationError> {
    let object = as_object(value, path)?;
    Ok(Milestone {
        milestone_name: required_text(object, "milestone_name", path)?,
        tasks: required_text_list(object, "tasks", path)?,
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaValidationError> {
    value.as_object().ok_or_else(|| SchemaValidationError::WrongType {
        path: path.to_string(),
        expected: "an object",
        found: type_name(value),
    })
}

fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<(&'a Value, String), SchemaValidationError> {
    let path = field_path(parent, key);
    match object.get(key) {
        None | Some(Value::Null) => Err(SchemaValidationError::MissingField(path)),
        Some(value) => Ok((value, path)),
    }
}

fn required_array<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<&'a Vec<Value>, SchemaValidationError> {
    let (value, path) = required(object, key, parent)?;
    value.as_array().ok_or_else(|| SchemaValidationError::WrongType {
        path,
        expected: "an array",
        found: type_name(value),
    })
}

fn required_text(
    object: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<String, SchemaValidationError> {
    let (value, path) = required(object, key, parent)?;
    let Some(text) = value.as_str() else {
        return Err(SchemaValidationError::WrongType {
            path,
            expected: "text",
            found: type_name(value),
        });
    };
    non_empty(text, path)
}

fn required_text_list(
    object: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<Vec<String>, SchemaValidationError> {
    let items = required_array(object, key, parent)?;
    let path = field_path(parent, key);

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item.as_str() {
            Some(text) => non_empty(text, format!("{path}[{index}]")),
            None => Err(SchemaValidationError::NonTextElement {
                path: format!("{path}[{index}]"),
                found: type_name(item),
            }),
        })
        .collect()
}

fn required_hours(
    object: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<f64, SchemaValidationError> {
    let (value, path) = required(object, key, parent)?;
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_hours(text),
        other => {
            return Err(SchemaValidationError::WrongType {
                path,
                expected: "a number",
                found: type_name(other),
            })
        }
    };

    match parsed {
        Some(hours) if hours.is_finite() && hours >= 0.0 => Ok(hours),
        _ => Err(SchemaValidationError::InvalidNumber { path, value: render_scalar(value) }),
    }
}

/// Accepts `"8"`, `"8.5"` and unit-suffixed forms such as `"12 hours"`.
fn parse_hours(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let numeric = HOUR_SUFFIXES
        .iter()
        .find_map(|suffix| lowered.strip_suffix(suffix))
        .map(str::trim_end)
        .unwrap_or(lowered.as_str());
    numeric.parse::<f64>().ok()
}

fn non_empty(text: &str, path: String) -> Result<String, SchemaValidationError> {
    if text.trim().is_empty() {
        return Err(SchemaValidationError::EmptyText(path));
    }
    Ok(text.to_string())
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
