//! Checker argument parsing, flag emission and run-id generation.
//!
//! Extra command-line words are parsed against the approach's argument schema
//! with a clap [`Command`] built at runtime, then converted to typed JSON
//! values once, before any case runs.

use chrono::{DateTime, Utc};
use clap::error::{ContextKind, ErrorKind};
use clap::{Arg, ArgAction, Command};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use uuid::Uuid;

use super::config::{ApproachConfig, ArgSpec, ArgType, ChoiceMetadata};
use crate::error::RunError;
use crate::utils::slugify;

/// Resolved checker arguments, in schema order. Unset arguments are `Null`.
pub type ArgValues = IndexMap<String, Value>;

/// Parsed checker arguments plus the choice metadata each value selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs {
    pub values: ArgValues,
    pub selections: IndexMap<String, Option<ChoiceMetadata>>,
}

/// `model_name` becomes `--model-name`.
pub fn flag_name(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

/// Parses a boolean flag value.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("Expected boolean value, got '{}'", value)),
    }
}

/// Parses `extra` against the schema in `config`.
///
/// Precedence per argument: command line, then `defaults` (values recorded by
/// a resumed run), then the schema default.
pub fn parse_approach_arguments(
    config: &ApproachConfig,
    extra: &[String],
    defaults: &IndexMap<String, Value>,
) -> Result<ResolvedArgs, RunError> {
    if config.arguments.is_empty() {
        if !extra.is_empty() {
            return Err(RunError::Configuration(format!(
                "Approach config defines no arguments, but received extras: {}",
                extra.join(" ")
            )));
        }
        return Ok(ResolvedArgs::default());
    }

    let mut command = Command::new("approach")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true);
    for (name, spec) in &config.arguments {
        let mut arg = Arg::new(name.clone())
            .long(name.replace('_', "-"))
            .action(ArgAction::Set)
            .num_args(1)
            .allow_hyphen_values(true);
        if let Some(help) = &spec.help {
            arg = arg.help(help.clone());
        }
        command = command.arg(arg);
    }

    let matches = command.try_get_matches_from(extra).map_err(|e| match e.kind() {
        ErrorKind::UnknownArgument => {
            let offending = match e.get(ContextKind::InvalidArg) {
                Some(value) => value.to_string(),
                None => extra.join(" "),
            };
            RunError::Configuration(format!("Unrecognised approach arguments: {}", offending))
        }
        _ => RunError::Configuration(e.to_string()),
    })?;

    let mut resolved = ResolvedArgs::default();
    for (name, spec) in &config.arguments {
        let value = match matches.get_one::<String>(name) {
            Some(raw) => convert_value(name, spec, raw)?,
            None => defaults
                .get(name)
                .cloned()
                .or_else(|| spec.default.clone())
                .unwrap_or(Value::Null),
        };
        let selection = spec
            .choices
            .iter()
            .find(|choice| choice.value() == Some(&value))
            .and_then(|choice| choice.metadata().cloned());
        resolved.values.insert(name.clone(), value);
        resolved.selections.insert(name.clone(), selection);
    }
    Ok(resolved)
}

fn convert_value(name: &str, spec: &ArgSpec, raw: &str) -> Result<Value, RunError> {
    let invalid = |detail: String| {
        RunError::Configuration(format!("argument {}: {}", flag_name(name), detail))
    };
    let value = match spec.arg_type {
        ArgType::Str => Value::String(raw.to_string()),
        ArgType::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("invalid int value: '{}'", raw)))?,
        ArgType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(format!("invalid float value: '{}'", raw)))?,
        ArgType::Bool => Value::Bool(parse_bool(raw).map_err(invalid)?),
    };

    if !spec.choices.is_empty() && !spec.choices.iter().any(|c| c.value() == Some(&value)) {
        let allowed: Vec<String> = spec
            .choices
            .iter()
            .filter_map(|c| c.value())
            .map(display_value)
            .collect();
        return Err(invalid(format!(
            "invalid choice: '{}' (choose from {})",
            raw,
            allowed.join(", ")
        )));
    }
    Ok(value)
}

/// Text form of a scalar, without JSON quoting for strings.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turns resolved values into checker flags.
///
/// `true` emits the bare flag, `false` and `Null` emit nothing, arrays repeat
/// the flag once per element.
pub fn emit_flags(values: &ArgValues) -> Vec<String> {
    let mut flags = Vec::new();
    for (name, value) in values {
        let flag = flag_name(name);
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => flags.push(flag),
            Value::Array(items) => {
                for item in items {
                    flags.push(flag.clone());
                    flags.push(display_value(item));
                }
            }
            other => {
                flags.push(flag);
                flags.push(display_value(other));
            }
        }
    }
    flags
}

/// Slug describing the argument selection, used as the run-id prefix.
pub fn run_slug(args: &ResolvedArgs, approach_id: &str) -> String {
    let mut components = Vec::new();
    for (name, value) in &args.values {
        match value {
            Value::Bool(true) => components.push(slugify(name)),
            Value::Bool(false) | Value::Null => {}
            Value::String(s) if s.is_empty() => {}
            other => {
                let run_id = args
                    .selections
                    .get(name)
                    .and_then(|s| s.as_ref())
                    .and_then(|meta| meta.run_id.as_deref())
                    .filter(|id| !id.is_empty());
                match run_id {
                    Some(id) => components.push(slugify(id)),
                    None => components.push(slugify(&display_value(other))),
                }
            }
        }
    }
    if components.is_empty() {
        components.push(slugify(approach_id));
    }
    components.join("-")
}

/// `<slug>-<YYYY-MM-DD-HHMM>-<6 hex>`.
pub fn generate_run_id(slug: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", slug, now.format("%Y-%m-%d-%H%M"), &suffix[..6])
}
