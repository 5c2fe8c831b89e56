//! Per-run collection and grouping of runs by checker configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::cases::{load_case, load_gold_issues};
use crate::error::ReportError;
use crate::scoring::{evaluate, tokenize_all, Averages, StatsAccumulator, Totals};

/// Scored stats of one run, overall and per `course/exercise`.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub overall: StatsAccumulator,
    pub per_exercise: BTreeMap<String, StatsAccumulator>,
}

/// Totals and averages of one accumulator, as written to reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub totals: Totals,
    pub averages: Averages,
}

impl From<&StatsAccumulator> for StatsSummary {
    fn from(acc: &StatsAccumulator) -> Self {
        Self {
            totals: acc.totals(),
            averages: acc.averages(),
        }
    }
}

/// All `*.json` files below `cases_dir`, sorted by path.
pub fn case_files(cases_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(cases_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .collect();
    files.sort();
    files
}

/// Scores every case output under `cases_dir` against the gold annotations
/// in `data_root`.
///
/// Cases without gold or predictions still count towards timing and cost.
/// Unreadable case files are skipped.
pub fn collect_run_stats(cases_dir: &Path, data_root: &Path) -> RunStats {
    let mut stats = RunStats::default();

    for path in case_files(cases_dir) {
        let record = match load_case(cases_dir, &path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable case output");
                continue;
            }
        };

        let evaluation = match (&record.parts, &record.predictions) {
            (None, _) => {
                warn!(case = %record.relative, "Cannot resolve case identity; match metrics skipped");
                None
            }
            (Some(_), None) => {
                warn!(case = %record.relative, "No predicted issues in case output; match metrics skipped");
                None
            }
            (Some(parts), Some(predictions)) => match load_gold_issues(data_root, parts) {
                Ok(gold) => Some(evaluate(&tokenize_all(&gold), &tokenize_all(predictions))),
                Err(ReportError::AnnotationMissing { path }) => {
                    warn!(
                        case = %record.relative,
                        gold = %path.display(),
                        "Gold annotation missing; match metrics skipped"
                    );
                    None
                }
                Err(e) => {
                    warn!(case = %record.relative, error = %e, "Failed to load gold annotation");
                    None
                }
            },
        };

        stats
            .overall
            .add_case(evaluation.as_ref(), record.duration_s, record.cost_usd);
        if let Some(key) = &record.exercise_key {
            stats
                .per_exercise
                .entry(key.clone())
                .or_default()
                .add_case(evaluation.as_ref(), record.duration_s, record.cost_usd);
        }
    }

    debug!(
        cases_dir = %cases_dir.display(),
        cases = stats.overall.cases,
        evaluated = stats.overall.evaluated_cases,
        "Collected run stats"
    );
    stats
}

/// Canonical `name -> text` form of run arguments: keys sorted, nulls
/// dropped, non-scalars rendered as JSON with sorted object keys.
pub fn flatten_args(args: &IndexMap<String, Value>) -> BTreeMap<String, String> {
    args.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => v.to_string(),
                other => canonical_json(other).to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

/// `"<benchmark> :: k=v, k=v"`, or `"<benchmark> :: default"` without args.
pub fn config_key(benchmark: &str, args: &IndexMap<String, Value>) -> String {
    let flat = flatten_args(args);
    if flat.is_empty() {
        return format!("{} :: default", benchmark);
    }
    let body = flat
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} :: {}", benchmark, body)
}

/// Config key without the `<benchmark> :: ` prefix.
pub fn display_config_key<'a>(key: &'a str, benchmark: &str) -> &'a str {
    key.strip_prefix(benchmark)
        .and_then(|rest| rest.strip_prefix(" :: "))
        .unwrap_or(key)
}

/// One aggregate row per configuration group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupRow {
    pub benchmark: String,
    pub model: String,
    pub config_key: String,
    pub n_runs: u64,
    pub totals: Totals,
    pub averages: Averages,
}

/// Per-exercise row inside a group.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseRow {
    pub exercise: String,
    pub totals: Totals,
    pub averages: Averages,
}

/// Runs sharing a config key, merged.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    pub benchmark: String,
    pub config_key: String,
    pub model_values: BTreeSet<String>,
    pub run_count: u64,
    pub overall: StatsAccumulator,
    pub per_exercise: BTreeMap<String, StatsAccumulator>,
}

impl GroupAccumulator {
    pub fn new(benchmark: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            config_key: config_key.into(),
            model_values: BTreeSet::new(),
            run_count: 0,
            overall: StatsAccumulator::new(),
            per_exercise: BTreeMap::new(),
        }
    }

    pub fn add_run(&mut self, args: &IndexMap<String, Value>, stats: &RunStats) {
        self.run_count += 1;
        if let Some(model) = args.get("model").filter(|v| !v.is_null()) {
            let text = match model {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.model_values.insert(text);
        }
        self.overall.merge(&stats.overall);
        for (exercise, acc) in &stats.per_exercise {
            self.per_exercise
                .entry(exercise.clone())
                .or_default()
                .merge(acc);
        }
    }

    /// Models seen across the group, or `-` when none was recorded.
    pub fn model_label(&self) -> String {
        if self.model_values.is_empty() {
            "-".to_string()
        } else {
            self.model_values
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    pub fn row(&self) -> GroupRow {
        GroupRow {
            benchmark: self.benchmark.clone(),
            model: self.model_label(),
            config_key: self.config_key.clone(),
            n_runs: self.run_count,
            totals: self.overall.totals(),
            averages: self.overall.averages(),
        }
    }

    pub fn per_exercise_summary(&self) -> Vec<ExerciseRow> {
        self.per_exercise
            .iter()
            .map(|(exercise, acc)| ExerciseRow {
                exercise: exercise.clone(),
                totals: acc.totals(),
                averages: acc.averages(),
            })
            .collect()
    }
}
