//! Benchmark reporting.
//!
//! Every run directory under `results/<benchmark>/` is scored against the
//! gold annotations, written to `<run>/run_report.json`, and grouped with
//! other runs sharing the same checker configuration into `summary.json`
//! and `summary.md`.

pub mod aggregate;
pub mod cases;
pub mod dataset;
pub mod markdown;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::BenchContext;
use crate::error::ReportError;
use crate::runner::DEFAULT_APPROACH_ID;
use crate::scoring::{Averages, Totals};
use crate::utils::load_structured;

pub use aggregate::{
    case_files, collect_run_stats, config_key, display_config_key, flatten_args, ExerciseRow,
    GroupAccumulator, GroupRow, RunStats, StatsSummary,
};
pub use cases::{load_case, load_gold_issues, CaseParts, CaseRecord};
pub use dataset::{summarise_dataset, DatasetSummary, InjectionAnalysis};
pub use markdown::{format_number, render_summary};

/// Where to read runs from and what to call the benchmark.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub benchmark: String,
    pub results_root: PathBuf,
    pub runs_root: PathBuf,
    pub data_root: PathBuf,
    /// Subdirectory of the benchmark root receiving the summaries. It is
    /// never treated as a run.
    pub aggregate_dir: Option<String>,
}

impl ReportOptions {
    pub fn new(ctx: &BenchContext) -> Self {
        Self {
            benchmark: DEFAULT_APPROACH_ID.to_string(),
            results_root: ctx.results_root.clone(),
            runs_root: ctx.runs_root.clone(),
            data_root: ctx.data_root.clone(),
            aggregate_dir: None,
        }
    }

    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = benchmark.into();
        self
    }

    pub fn with_results_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_root = dir.into();
        self
    }

    pub fn with_runs_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runs_root = dir.into();
        self
    }

    pub fn with_aggregate_dir(mut self, name: impl Into<String>) -> Self {
        self.aggregate_dir = Some(name.into());
        self
    }

    pub fn benchmark_root(&self) -> PathBuf {
        self.results_root.join(&self.benchmark)
    }
}

/// Run identity as recorded in its metadata file.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub approach_id: Option<Value>,
    pub config_key: String,
    pub args: IndexMap<String, Value>,
    pub generated_at: Option<Value>,
    pub cases_executed: Option<Value>,
    pub cases_failed: Option<Value>,
}

/// Contents of `<run>/run_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub benchmark: String,
    pub config: RunConfig,
    pub totals: Totals,
    pub averages: Averages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_exercise: Option<BTreeMap<String, StatsSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseTable {
    pub model: String,
    pub exercises: Vec<ExerciseRow>,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub benchmark: String,
    pub generated_at: String,
    pub dataset_summary: DatasetSummary,
    /// One row per config key, sorted by key.
    pub runs: Vec<GroupRow>,
    pub per_exercise: BTreeMap<String, ExerciseTable>,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub run_reports: Vec<RunReport>,
    pub summary: BenchmarkSummary,
    pub summary_json: PathBuf,
    pub summary_md: PathBuf,
}

fn load_run_metadata(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Default::default());
    }
    match load_structured::<Value>(path) {
        Ok(value) if value.is_object() => value,
        Ok(_) => Value::Object(Default::default()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable run metadata");
            Value::Object(Default::default())
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Scores every run of `options.benchmark` and writes the run reports and
/// benchmark summaries.
pub fn generate_report(
    options: &ReportOptions,
    now: DateTime<Utc>,
) -> Result<ReportOutcome, ReportError> {
    let benchmark = options.benchmark.as_str();
    let benchmark_root = options.benchmark_root();
    if !benchmark_root.exists() {
        return Err(ReportError::BenchmarkNotFound(benchmark_root));
    }

    let aggregate_root = options.aggregate_dir.as_ref().map(|d| benchmark_root.join(d));
    if let Some(dir) = &aggregate_root {
        fs::create_dir_all(dir)?;
    }

    let dataset_summary = summarise_dataset(&options.data_root, None)?;

    let mut run_dirs: Vec<PathBuf> = fs::read_dir(&benchmark_root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    run_dirs.sort();

    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    let mut run_reports = Vec::new();

    for run_dir in run_dirs {
        if aggregate_root.as_ref() == Some(&run_dir) {
            continue;
        }
        let cases_dir = run_dir.join("cases");
        if !cases_dir.is_dir() || case_files(&cases_dir).is_empty() {
            continue;
        }

        let run_id = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stats = collect_run_stats(&cases_dir, &options.data_root);

        let metadata =
            load_run_metadata(&options.runs_root.join(benchmark).join(format!("{}.yaml", run_id)));
        let args: IndexMap<String, Value> = metadata
            .get("args")
            .and_then(|a| a.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let key = config_key(benchmark, &args);

        groups
            .entry(key.clone())
            .or_insert_with(|| GroupAccumulator::new(benchmark, key.clone()))
            .add_run(&args, &stats);

        let per_exercise: BTreeMap<String, StatsSummary> = stats
            .per_exercise
            .iter()
            .map(|(k, acc)| (k.clone(), StatsSummary::from(acc)))
            .collect();
        let field = |name: &str| metadata.get(name).cloned();
        let report = RunReport {
            run_id: run_id.clone(),
            benchmark: benchmark.to_string(),
            config: RunConfig {
                approach_id: field("approach_id"),
                config_key: key,
                args,
                generated_at: field("generated_at"),
                cases_executed: field("cases_executed"),
                cases_failed: field("cases_failed"),
            },
            totals: stats.overall.totals(),
            averages: stats.overall.averages(),
            per_exercise: (!per_exercise.is_empty()).then_some(per_exercise),
        };
        write_json(&run_dir.join("run_report.json"), &report)?;
        info!(run_id = %run_id, cases = report.totals.cases, "Wrote run report");
        run_reports.push(report);
    }

    let runs: Vec<GroupRow> = groups.values().map(GroupAccumulator::row).collect();
    let per_exercise = groups
        .iter()
        .map(|(key, group)| {
            (
                key.clone(),
                ExerciseTable {
                    model: group.model_label(),
                    exercises: group.per_exercise_summary(),
                },
            )
        })
        .collect();

    let summary = BenchmarkSummary {
        benchmark: benchmark.to_string(),
        generated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        dataset_summary,
        runs,
        per_exercise,
    };

    let out_dir = aggregate_root.unwrap_or(benchmark_root);
    let summary_json = out_dir.join("summary.json");
    write_json(&summary_json, &summary)?;
    let summary_md = out_dir.join("summary.md");
    fs::write(&summary_md, render_summary(&summary))?;

    info!(
        benchmark,
        runs = run_reports.len(),
        groups = summary.runs.len(),
        summary = %summary_json.display(),
        "Report generated"
    );

    Ok(ReportOutcome {
        run_reports,
        summary,
        summary_json,
        summary_md,
    })
}
