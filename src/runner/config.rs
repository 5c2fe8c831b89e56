//! Approach configuration.
//!
//! An approach is one consistency checker plus the argument schema it
//! accepts. Configs live under `configs/` as YAML:
//!
//! ```yaml
//! approach_id: pecv-reference
//! entrypoints:
//!   run_case: python -m pecv_reference.runner
//!   prepare: python -m pecv_reference.prepare
//! arguments:
//!   model:
//!     type: str
//!     default: openai:gpt-5-mini
//!     choices:
//!       - id: openai:gpt-5-mini
//!         run_id: gpt5mini
//!   reasoning_effort:
//!     type: str
//!     choices: [low, medium, high]
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RunError, StructuredError};
use crate::utils::load_structured;

/// Approach id used when neither the config nor the CLI names one.
pub const DEFAULT_APPROACH_ID: &str = "pecv-reference";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproachConfig {
    #[serde(default)]
    pub approach_id: Option<String>,
    #[serde(default)]
    pub entrypoints: Entrypoints,
    /// Declared checker arguments, in declaration order.
    #[serde(default)]
    pub arguments: IndexMap<String, ArgSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entrypoints {
    #[serde(default)]
    pub run_case: Option<String>,
    #[serde(default)]
    pub prepare: Option<String>,
}

/// Value type of a checker argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    #[serde(alias = "string")]
    Str,
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "boolean")]
    Bool,
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArgType::Str => "str",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Schema entry for one checker argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgSpec {
    #[serde(rename = "type", default)]
    pub arg_type: ArgType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub choices: Vec<ChoiceSpec>,
    #[serde(default)]
    pub help: Option<String>,
}

/// An allowed value: a plain scalar or an object carrying metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceSpec {
    Detailed(ChoiceMetadata),
    Scalar(Value),
}

/// Object form of a choice. `run_id` replaces the value in generated run ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMetadata {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ChoiceSpec {
    /// The value this choice admits; object choices without an `id` admit nothing.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ChoiceSpec::Detailed(meta) => meta.id.as_ref(),
            ChoiceSpec::Scalar(value) => Some(value),
        }
    }

    pub fn metadata(&self) -> Option<&ChoiceMetadata> {
        match self {
            ChoiceSpec::Detailed(meta) => Some(meta),
            ChoiceSpec::Scalar(_) => None,
        }
    }
}

impl ApproachConfig {
    /// Loads a config file, YAML or JSON by extension.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        match load_structured(path) {
            Ok(config) => Ok(config),
            Err(StructuredError::NotFound(path)) => Err(RunError::NotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// The `run_case` command line; required for running benchmarks.
    pub fn run_case_command(&self) -> Result<&str, RunError> {
        self.entrypoints
            .run_case
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
            .ok_or_else(|| {
                RunError::Configuration(
                    "Approach configuration must provide an 'entrypoints.run_case'".to_string(),
                )
            })
    }

    pub fn prepare_command(&self) -> Option<&str> {
        self.entrypoints
            .prepare
            .as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
    }

    pub fn approach_id_or_default(&self) -> &str {
        self.approach_id.as_deref().unwrap_or(DEFAULT_APPROACH_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
approach_id: pecv-reference
entrypoints:
  run_case: python -m pecv_reference.runner
arguments:
  model:
    type: str
    default: openai:gpt-5-mini
    choices:
      - id: openai:gpt-5-mini
        run_id: gpt5mini
        label: GPT-5 mini
      - openai:o4-mini
  temperature:
    type: float
  verbose:
    type: bool
    help: Print progress
"#;

    #[test]
    fn test_load_yaml_preserves_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("approach.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let config = ApproachConfig::load(&path).unwrap();
        assert_eq!(config.approach_id_or_default(), "pecv-reference");
        assert_eq!(
            config.arguments.keys().collect::<Vec<_>>(),
            vec!["model", "temperature", "verbose"]
        );
        assert_eq!(config.arguments["temperature"].arg_type, ArgType::Float);
        assert_eq!(config.run_case_command().unwrap(), "python -m pecv_reference.runner");
        assert!(config.prepare_command().is_none());

        let choices = &config.arguments["model"].choices;
        assert_eq!(choices.len(), 2);
        let meta = choices[0].metadata().unwrap();
        assert_eq!(meta.run_id.as_deref(), Some("gpt5mini"));
        assert_eq!(meta.extra.get("label"), Some(&Value::from("GPT-5 mini")));
        assert_eq!(choices[1].value(), Some(&Value::from("openai:o4-mini")));
    }

    #[test]
    fn test_missing_config() {
        let temp = TempDir::new().unwrap();
        let err = ApproachConfig::load(&temp.path().join("none.yaml")).unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
    }

    #[test]
    fn test_run_case_required() {
        let config = ApproachConfig::default();
        assert!(matches!(
            config.run_case_command().unwrap_err(),
            RunError::Configuration(_)
        ));
        assert_eq!(config.approach_id_or_default(), DEFAULT_APPROACH_ID);
    }
}
