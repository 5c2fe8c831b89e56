//! Persisted run metadata under `runs/<approach>/<run_id>.yaml`.
//!
//! The record is written once before any case runs (no counts) and again when
//! the run ends or is interrupted, so an aborted run can still be resumed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::BenchContext;
use crate::error::{RunError, StructuredError};
use crate::utils::{dump_structured, load_structured};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub approach_id: String,
    pub run_id: String,
    #[serde(default)]
    pub args: IndexMap<String, Value>,
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases_executed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases_failed: Option<u64>,
}

/// Final counters written with the closing metadata record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub executed: u64,
    pub failed: u64,
}

impl RunMetadata {
    pub fn new(approach_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            approach_id: approach_id.into(),
            run_id: run_id.into(),
            args: IndexMap::new(),
            config_path: None,
            generated_at: None,
            cases_executed: None,
            cases_failed: None,
        }
    }

    pub fn with_args(mut self, args: IndexMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_config_path(mut self, config_path: impl Into<String>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    pub fn with_counts(mut self, counts: RunCounts) -> Self {
        self.cases_executed = Some(counts.executed);
        self.cases_failed = Some(counts.failed);
        self
    }

    /// Loads a metadata file, YAML or JSON by extension.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        match load_structured(path) {
            Ok(metadata) => Ok(metadata),
            Err(StructuredError::NotFound(path)) => Err(RunError::NotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// `runs/<approach>/<run_id>.yaml`
    pub fn path_for(ctx: &BenchContext, approach_id: &str, run_id: &str) -> PathBuf {
        ctx.runs_root
            .join(approach_id)
            .join(format!("{}.yaml", run_id))
    }

    /// Stamps `generated_at` and writes the record to its canonical location.
    pub fn write(&mut self, ctx: &BenchContext, now: DateTime<Utc>) -> Result<PathBuf, RunError> {
        self.generated_at = Some(now.to_rfc3339_opts(SecondsFormat::Micros, false));
        let path = Self::path_for(ctx, &self.approach_id, &self.run_id);
        dump_structured(&path, self)?;
        Ok(path)
    }

    /// Parsed `generated_at`, if present and well formed.
    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.generated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Exercises recorded in the `exercises` argument, if any.
    pub fn recorded_exercises(&self) -> Vec<String> {
        match self.args.get("exercises") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Recorded arguments usable as defaults when resuming.
    pub fn resume_defaults(&self) -> IndexMap<String, Value> {
        self.args
            .iter()
            .filter(|(key, _)| key.as_str() != "exercises")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_load() {
        let temp = TempDir::new().unwrap();
        let ctx = BenchContext::new(temp.path());
        let mut args = IndexMap::new();
        args.insert("model".to_string(), Value::from("gpt"));
        args.insert("exercises".to_string(), serde_json::json!(["ITP/H01"]));

        let mut metadata = RunMetadata::new("pecv-reference", "run-1")
            .with_args(args)
            .with_config_path("configs/pecv-reference.yaml");
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let path = metadata.write(&ctx, now).unwrap();
        assert_eq!(path, temp.path().join("runs/pecv-reference/run-1.yaml"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("cases_executed"));

        let loaded = RunMetadata::load(&path).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.generated_at_utc(), Some(now));
        assert_eq!(loaded.recorded_exercises(), vec!["ITP/H01"]);
        assert!(!loaded.resume_defaults().contains_key("exercises"));
        assert!(loaded.resume_defaults().contains_key("model"));
    }

    #[test]
    fn test_counts_written() {
        let temp = TempDir::new().unwrap();
        let ctx = BenchContext::new(temp.path());
        let mut metadata = RunMetadata::new("a", "r").with_counts(RunCounts {
            executed: 5,
            failed: 1,
        });
        let path = metadata.write(&ctx, Utc::now()).unwrap();
        let loaded = RunMetadata::load(&path).unwrap();
        assert_eq!(loaded.cases_executed, Some(5));
        assert_eq!(loaded.cases_failed, Some(1));
    }

    #[test]
    fn test_load_json_and_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("meta.json");
        std::fs::write(&path, r#"{"approach_id": "a", "run_id": "r", "cases_executed": 3}"#)
            .unwrap();
        let loaded = RunMetadata::load(&path).unwrap();
        assert_eq!(loaded.cases_executed, Some(3));
        assert!(loaded.args.is_empty());

        assert!(matches!(
            RunMetadata::load(&temp.path().join("missing.yaml")).unwrap_err(),
            RunError::NotFound(_)
        ));
    }
}
