//! Declarative stage definitions.
//!
//! A catalog holds exactly one definition per [`StageId`]. Catalogs are read
//! from TOML and validated as a whole when loaded, so a missing persona field
//! or a schema attached to the wrong stage is reported before any run starts.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../config/stages.toml");
const BUILTIN_SOURCE: &str = "<builtin>";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Breakdown,
    Estimation,
    Allocation,
}

impl StageId {
    /// Execution order.
    pub const ALL: [StageId; 3] = [Self::Breakdown, Self::Estimation, Self::Allocation];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakdown => "breakdown",
            Self::Estimation => "estimation",
            Self::Allocation => "allocation",
        }
    }

    /// 1-based position in the pipeline.
    pub fn position(self) -> usize {
        match self {
            Self::Breakdown => 1,
            Self::Estimation => 2,
            Self::Allocation => 3,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = StageConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "breakdown" => Ok(Self::Breakdown),
            "estimation" => Ok(Self::Estimation),
            "allocation" => Ok(Self::Allocation),
            other => Err(StageConfigError::UnknownStage(other.to_string())),
        }
    }
}

/// Shape a stage's final answer must be coerced into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    ProjectPlan,
}

impl OutputSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectPlan => "project_plan",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: StageId,
    pub persona: Persona,
    pub instructions: String,
    pub expected_output: String,
    pub output_schema: Option<OutputSchema>,
}

#[derive(Debug, Error)]
pub enum StageConfigError {
    #[error("could not read stage catalog `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse stage catalog `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("unknown stage `{0}` (expected breakdown|estimation|allocation)")]
    UnknownStage(String),
    #[error("stage `{0}` is not defined")]
    MissingStage(StageId),
    #[error("stage `{stage}` is malformed: {reason}")]
    Malformed { stage: StageId, reason: String },
    #[error("stage `{stage}` has an invalid instruction template: {reason}")]
    InvalidTemplate { stage: StageId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageCatalog {
    stages: BTreeMap<StageId, StageDefinition>,
}

impl StageCatalog {
    /// Definitions bundled with the crate.
    pub fn builtin() -> Result<Self, StageConfigError> {
        Self::from_toml_str(BUILTIN_CATALOG, Path::new(BUILTIN_SOURCE))
    }

    pub fn load(path: &Path) -> Result<Self, StageConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| StageConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let catalog = Self::from_toml_str(&raw, path)?;
        tracing::debug!(
            event_name = "pipeline.stages.loaded",
            path = %path.display(),
            "stage catalog loaded"
        );
        Ok(catalog)
    }

    /// Loads `path` when given, the bundled definitions otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self, StageConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str, source: &Path) -> Result<Self, StageConfigError> {
        let file = toml::from_str::<CatalogFile>(raw).map_err(|error| {
            StageConfigError::ParseFile { path: source.to_path_buf(), source: error }
        })?;
        Self::from_raw(file)
    }

    pub fn from_definitions(
        definitions: impl IntoIterator<Item = StageDefinition>,
    ) -> Result<Self, StageConfigError> {
        let stages =
            definitions.into_iter().map(|definition| (definition.id, definition)).collect();
        let catalog = Self { stages };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn lookup(&self, id: StageId) -> Result<&StageDefinition, StageConfigError> {
        self.stages.get(&id).ok_or(StageConfigError::MissingStage(id))
    }

    /// Definitions in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.values()
    }

    fn from_raw(file: CatalogFile) -> Result<Self, StageConfigError> {
        let mut stages = BTreeMap::new();
        for (key, raw) in file.stages {
            let id = key.parse::<StageId>()?;
            stages.insert(id, raw.into_definition(id)?);
        }

        let catalog = Self { stages };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), StageConfigError> {
        for id in StageId::ALL {
            let definition = self.stages.get(&id).ok_or(StageConfigError::MissingStage(id))?;
            validate_definition(definition)?;
        }
        Ok(())
    }
}

fn validate_definition(definition: &StageDefinition) -> Result<(), StageConfigError> {
    let stage = definition.id;
    let required = [
        ("persona.role", &definition.persona.role),
        ("persona.goal", &definition.persona.goal),
        ("instructions", &definition.instructions),
        ("expected_output", &definition.expected_output),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(StageConfigError::Malformed {
                stage,
                reason: format!("`{field}` must not be empty"),
            });
        }
    }

    match (stage, definition.output_schema) {
        (StageId::Allocation, None) => Err(StageConfigError::Malformed {
            stage,
            reason: "`output_schema` is required on the final stage".to_string(),
        }),
        (StageId::Breakdown | StageId::Estimation, Some(schema)) => {
            Err(StageConfigError::Malformed {
                stage,
                reason: format!(
                    "`output_schema = \"{}\"` is only allowed on the final stage",
                    schema.as_str()
                ),
            })
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    stages: BTreeMap<String, StagePatch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StagePatch {
    instructions: Option<String>,
    expected_output: Option<String>,
    output_schema: Option<OutputSchema>,
    persona: Option<PersonaPatch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersonaPatch {
    role: Option<String>,
    goal: Option<String>,
    backstory: Option<String>,
}

impl StagePatch {
    fn into_definition(self, id: StageId) -> Result<StageDefinition, StageConfigError> {
        let missing = |field: &str| StageConfigError::Malformed {
            stage: id,
            reason: format!("`{field}` is required"),
        };

        let persona = self.persona.ok_or_else(|| missing("persona"))?;
        Ok(StageDefinition {
            id,
            persona: Persona {
                role: persona.role.ok_or_else(|| missing("persona.role"))?,
                goal: persona.goal.ok_or_else(|| missing("persona.goal"))?,
                backstory: persona.backstory.unwrap_or_default(),
            },
            instructions: self.instructions.ok_or_else(|| missing("instructions"))?,
            expected_output: self.expected_output.ok_or_else(|| missing("expected_output"))?,
            output_schema: self.output_schema,
        })
    }
}
