//! Benchmark run orchestration.
//!
//! A run is split in two phases:
//! 1. [`RunOrchestrator::prepare`] resolves config, resume state, arguments
//!    and the task list. All configuration errors surface here, before any
//!    case runs.
//! 2. [`RunOrchestrator::execute`] runs the tasks on a fixed-size worker
//!    pool and persists run metadata before and after.
//!
//! Workers report each finished case over a channel; only the collector
//! touches the run statistics.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::args::{generate_run_id, parse_approach_arguments, run_slug, ResolvedArgs};
use super::checker::{CaseInvocation, Checker, ProcessChecker};
use super::config::ApproachConfig;
use super::metadata::{RunCounts, RunMetadata};
use super::progress::{ProgressCounters, ProgressMonitor};
use crate::context::BenchContext;
use crate::error::RunError;
use crate::exercise::{iter_exercises, ExerciseId};
use crate::variants::VariantManager;

/// Exit code for a run interrupted by the user.
pub const EXIT_INTERRUPTED: i32 = 130;

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub config_path: Option<PathBuf>,
    pub approach: Option<String>,
    pub exercises: Vec<String>,
    pub variants: Vec<String>,
    pub run_id: Option<String>,
    pub skip_existing: bool,
    pub force_materialize: bool,
    pub clean_after: bool,
    pub keep_outputs: bool,
    pub max_concurrency: usize,
    /// Metadata file path, or a run id under `runs/<approach>/`.
    pub resume_run: Option<String>,
    pub resume_run_id: Option<String>,
    /// Words passed through to the approach argument schema.
    pub extra_args: Vec<String>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            config_path: None,
            approach: None,
            exercises: Vec::new(),
            variants: Vec::new(),
            run_id: None,
            skip_existing: false,
            force_materialize: false,
            clean_after: false,
            keep_outputs: false,
            max_concurrency: 1,
            resume_run: None,
            resume_run_id: None,
            extra_args: Vec::new(),
        }
    }
}

impl RunRequest {
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_exercise(mut self, exercise: impl Into<String>) -> Self {
        self.exercises.push(exercise.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variants.push(variant.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    pub fn with_resume_run(mut self, resume: impl Into<String>) -> Self {
        self.resume_run = Some(resume.into());
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

/// Lifecycle of one case task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Materializing,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for CaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CaseState::Pending => "pending",
            CaseState::Materializing => "materializing",
            CaseState::Running => "running",
            CaseState::Succeeded => "succeeded",
            CaseState::Failed => "failed",
            CaseState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// One (exercise, variant) execution.
#[derive(Debug, Clone)]
pub struct CaseTask {
    pub exercise: ExerciseId,
    pub variant_id: String,
    pub case_id: String,
    pub target_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Everything resolved before execution starts.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub approach_id: String,
    pub run_id: String,
    pub config_path: PathBuf,
    pub config: ApproachConfig,
    pub args: ResolvedArgs,
    pub results_dir: PathBuf,
    pub tasks: Vec<CaseTask>,
    /// Counters carried over from a resumed run plus cases skipped up front.
    pub initial_stats: RunStats,
    pub force_materialize: bool,
    pub clean_after: bool,
    pub keep_outputs: bool,
    pub max_concurrency: usize,
}

/// Result of [`RunOrchestrator::execute`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub approach_id: String,
    pub run_id: String,
    pub stats: RunStats,
    pub errors: Vec<String>,
    pub interrupted: bool,
    pub metadata_path: PathBuf,
}

impl RunOutcome {
    /// 0 when clean, 1 when any case failed, 130 when interrupted.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if !self.errors.is_empty() {
            1
        } else {
            0
        }
    }
}

/// Outcome of one case, sent from a worker to the collector.
#[derive(Debug)]
struct CaseReport {
    case_id: String,
    state: CaseState,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct WorkerOptions {
    data_root: PathBuf,
    args: ResolvedArgs,
    force_materialize: bool,
    clean_after: bool,
    keep_outputs: bool,
    prefix_output: bool,
}

pub struct RunOrchestrator {
    ctx: BenchContext,
    progress_interval: Duration,
}

impl RunOrchestrator {
    pub fn new(ctx: BenchContext) -> Self {
        Self {
            ctx,
            progress_interval: Duration::from_secs(30),
        }
    }

    /// How often the progress monitor logs.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn context(&self) -> &BenchContext {
        &self.ctx
    }

    /// Prepares and executes a run with the configured process checker.
    pub async fn run(
        &self,
        request: &RunRequest,
        interrupts: mpsc::Receiver<()>,
    ) -> Result<RunOutcome, RunError> {
        let prepared = self.prepare(request)?;
        let checker = ProcessChecker::from_config(&prepared.config)?
            .with_pythonpath(self.ctx.reference_root.clone());
        self.execute(prepared, Arc::new(checker), interrupts).await
    }

    /// Resolves config, resume state, checker arguments and tasks.
    pub fn prepare(&self, request: &RunRequest) -> Result<PreparedRun, RunError> {
        if request.max_concurrency < 1 {
            return Err(RunError::Configuration(
                "--max-concurrency must be at least 1".to_string(),
            ));
        }

        let mut config_path = match &request.config_path {
            Some(path) => path.clone(),
            None => self.ctx.default_config_path(),
        };
        let mut config = ApproachConfig::load(&config_path)?;
        let lookup_approach = request
            .approach
            .clone()
            .unwrap_or_else(|| config.approach_id_or_default().to_string());

        let resume_path = self.locate_resume(request, &lookup_approach)?;
        let resume = match &resume_path {
            Some(path) => {
                info!(path = %path.display(), "Resuming run");
                Some(RunMetadata::load(path)?)
            }
            None => None,
        };

        if let (Some(resume), Some(approach)) = (&resume, &request.approach) {
            if &resume.approach_id != approach {
                return Err(RunError::Configuration(
                    "--approach conflicts with the approach recorded in the run metadata"
                        .to_string(),
                ));
            }
        }

        if let Some(hint) = resume.as_ref().and_then(|r| r.config_path.as_deref()) {
            let candidate = self.ctx.resolve(hint);
            if candidate.exists() {
                config = ApproachConfig::load(&candidate)?;
                config_path = candidate;
            }
        }

        let approach_id = request
            .approach
            .clone()
            .or_else(|| resume.as_ref().map(|r| r.approach_id.clone()))
            .unwrap_or_else(|| config.approach_id_or_default().to_string());

        let defaults = resume
            .as_ref()
            .map(RunMetadata::resume_defaults)
            .unwrap_or_default();
        let args = parse_approach_arguments(&config, &request.extra_args, &defaults)?;
        config.run_case_command()?;

        let run_id = match (&request.run_id, &resume, &request.resume_run_id) {
            (Some(explicit), _, _) => explicit.clone(),
            (None, Some(resume), _) => resume.run_id.clone(),
            (None, None, Some(resume_id)) => resume_id.clone(),
            (None, None, None) => generate_run_id(&run_slug(&args, &approach_id), Utc::now()),
        };

        let mut requested = request.exercises.clone();
        if requested.is_empty() {
            if let Some(resume) = &resume {
                requested = resume.recorded_exercises();
            }
        }
        if !request.variants.is_empty() && requested.len() != 1 {
            return Err(RunError::Configuration(
                "--variant requires exactly one --exercise to be specified".to_string(),
            ));
        }

        let skip_existing =
            request.skip_existing || resume.is_some() || request.resume_run_id.is_some();

        let mut initial_stats = RunStats::default();
        if let Some(resume) = &resume {
            initial_stats.executed = resume.cases_executed.unwrap_or(0);
        }

        let results_dir = self
            .ctx
            .results_root
            .join(&approach_id)
            .join(&run_id)
            .join("cases");

        let mut tasks = Vec::new();
        for exercise in self.resolve_exercises(&requested)? {
            let manager = VariantManager::open(&self.ctx.data_root, exercise.clone())?;
            let variant_ids = if request.variants.is_empty() {
                manager.variant_ids()?
            } else {
                request.variants.clone()
            };

            for variant_id in variant_ids {
                let case_id = exercise.case_id(&variant_id);
                let target_path = results_dir
                    .join(&exercise.course)
                    .join(&exercise.exercise)
                    .join(format!("{}.json", variant_id));

                if skip_existing && target_path.exists() {
                    debug!(case_id = %case_id, state = %CaseState::Skipped, "Output exists");
                    initial_stats.skipped += 1;
                    continue;
                }
                tasks.push(CaseTask {
                    exercise: exercise.clone(),
                    variant_id,
                    case_id,
                    target_path,
                });
            }
        }

        Ok(PreparedRun {
            approach_id,
            run_id,
            config_path,
            config,
            args,
            results_dir,
            tasks,
            initial_stats,
            force_materialize: request.force_materialize,
            clean_after: request.clean_after,
            keep_outputs: request.keep_outputs,
            max_concurrency: request.max_concurrency,
        })
    }

    fn locate_resume(
        &self,
        request: &RunRequest,
        approach: &str,
    ) -> Result<Option<PathBuf>, RunError> {
        if let Some(resume) = &request.resume_run {
            let candidate = PathBuf::from(resume);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            let inferred = RunMetadata::path_for(&self.ctx, approach, resume);
            if inferred.exists() {
                return Ok(Some(inferred));
            }
            return Err(RunError::NotFound(inferred));
        }
        if let Some(run_id) = &request.resume_run_id {
            let candidate = RunMetadata::path_for(&self.ctx, approach, run_id);
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn resolve_exercises(&self, requested: &[String]) -> Result<Vec<ExerciseId>, RunError> {
        if requested.is_empty() {
            return iter_exercises(&self.ctx.data_root)
                .map_err(|_| RunError::NotFound(self.ctx.data_root.clone()));
        }
        let mut seen = BTreeSet::new();
        let mut exercises = Vec::new();
        for value in requested {
            let id = ExerciseId::parse(value).map_err(RunError::Configuration)?;
            if seen.insert(id.relative()) {
                exercises.push(id);
            }
        }
        Ok(exercises)
    }

    /// Runs the prepared tasks.
    ///
    /// The first message on `interrupts` stops dispatching new cases and waits
    /// for in-flight ones; a second stops waiting. Metadata is written in
    /// every case.
    pub async fn execute(
        &self,
        prepared: PreparedRun,
        checker: Arc<dyn Checker>,
        mut interrupts: mpsc::Receiver<()>,
    ) -> Result<RunOutcome, RunError> {
        if let Err(e) = checker.prepare(&prepared.args.values, &prepared.config_path).await {
            error!(error = %e, "Failed to run prepare entrypoint");
            return Err(e.into());
        }

        std::fs::create_dir_all(&prepared.results_dir)?;
        let base_metadata = RunMetadata::new(&prepared.approach_id, &prepared.run_id)
            .with_args(prepared.args.values.clone())
            .with_config_path(self.ctx.relativize(&prepared.config_path));
        let metadata_path = base_metadata.clone().write(&self.ctx, Utc::now())?;

        let mut stats = prepared.initial_stats;
        let mut errors = Vec::new();
        let total = prepared.tasks.len();
        info!(
            approach = %prepared.approach_id,
            run_id = %prepared.run_id,
            cases = total,
            skipped = stats.skipped,
            workers = prepared.max_concurrency,
            "Starting benchmark run"
        );

        let counters = ProgressCounters::new();
        counters
            .skipped
            .fetch_add(stats.skipped as usize, Ordering::Relaxed);
        let monitor = (total > 0)
            .then(|| ProgressMonitor::start(counters.clone(), total, self.progress_interval));

        let queue = Arc::new(Mutex::new(VecDeque::from(prepared.tasks)));
        let stop = Arc::new(AtomicBool::new(false));
        let options = Arc::new(WorkerOptions {
            data_root: self.ctx.data_root.clone(),
            args: prepared.args.clone(),
            force_materialize: prepared.force_materialize,
            clean_after: prepared.clean_after,
            keep_outputs: prepared.keep_outputs,
            prefix_output: prepared.max_concurrency > 1,
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<CaseReport>();
        let workers = prepared.max_concurrency.min(total.max(1));
        for _ in 0..workers {
            let queue = queue.clone();
            let stop = stop.clone();
            let options = options.clone();
            let checker = checker.clone();
            let counters = counters.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some(task) = next else { break };
                    counters.in_flight.fetch_add(1, Ordering::Relaxed);
                    let report = execute_case(task, &options, checker.as_ref()).await;
                    counters.in_flight.fetch_sub(1, Ordering::Relaxed);
                    if tx.send(report).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut interrupted = false;
        let mut interrupts_open = true;
        loop {
            tokio::select! {
                report = rx.recv() => {
                    let Some(report) = report else { break };
                    match report.state {
                        CaseState::Succeeded => {
                            stats.executed += 1;
                            counters.executed.fetch_add(1, Ordering::Relaxed);
                            info!(case_id = %report.case_id, state = %report.state, "Case finished");
                        }
                        _ => {
                            stats.failed += 1;
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            let message = report.error.unwrap_or_else(|| format!("{}: failed", report.case_id));
                            warn!(case_id = %report.case_id, state = %report.state, "{}", message);
                            errors.push(message);
                        }
                    }
                }
                signal = interrupts.recv(), if interrupts_open => {
                    if signal.is_none() {
                        interrupts_open = false;
                    } else if !interrupted {
                        interrupted = true;
                        stop.store(true, Ordering::Relaxed);
                        warn!("Interrupt received, waiting for running cases to finish (interrupt again to stop waiting)");
                    } else {
                        warn!("Second interrupt, no longer waiting for running cases");
                        break;
                    }
                }
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        if interrupted {
            errors.push("Run interrupted by user".to_string());
        }

        let mut final_metadata = base_metadata.with_counts(RunCounts {
            executed: stats.executed,
            failed: stats.failed,
        });
        let metadata_path = match final_metadata.write(&self.ctx, Utc::now()) {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Failed to write final run metadata");
                metadata_path
            }
        };

        info!(
            executed = stats.executed,
            skipped = stats.skipped,
            failed = stats.failed,
            interrupted,
            "Benchmark run finished"
        );

        Ok(RunOutcome {
            approach_id: prepared.approach_id,
            run_id: prepared.run_id,
            stats,
            errors,
            interrupted,
            metadata_path,
        })
    }
}

/// Materializes, runs and optionally cleans one case. Never fails: errors
/// become a failed report.
async fn execute_case(task: CaseTask, options: &WorkerOptions, checker: &dyn Checker) -> CaseReport {
    debug!(case_id = %task.case_id, state = %CaseState::Materializing, variant_id = %task.variant_id);
    let materialized = {
        let data_root = options.data_root.clone();
        let exercise = task.exercise.clone();
        let variant_id = task.variant_id.clone();
        let force = options.force_materialize;
        tokio::task::spawn_blocking(move || {
            VariantManager::open(&data_root, exercise)?.materialize(&variant_id, force)
        })
        .await
    };
    let input_path = match materialized {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => return failed(&task, format!("materialize failed ({})", e)),
        Err(e) => return failed(&task, format!("materialize failed ({})", e)),
    };

    debug!(case_id = %task.case_id, state = %CaseState::Running, variant_id = %task.variant_id);
    let invocation = CaseInvocation {
        input_path,
        output_path: task.target_path.clone(),
        case_id: task.case_id.clone(),
        args: options.args.values.clone(),
        prefix_output: options.prefix_output,
    };
    let result = match create_parent(&task.target_path) {
        Ok(()) => checker.run_case(&invocation).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if result.is_err() && task.target_path.exists() {
        if let Err(e) = std::fs::remove_file(&task.target_path) {
            warn!(case_id = %task.case_id, error = %e, "Could not remove partial output");
        }
    }

    if options.clean_after {
        let data_root = options.data_root.clone();
        let exercise = task.exercise.clone();
        let variant_id = task.variant_id.clone();
        let keep_outputs = options.keep_outputs;
        let cleaned = tokio::task::spawn_blocking(move || {
            VariantManager::open(&data_root, exercise)?.clean(&variant_id, keep_outputs)
        })
        .await;
        match cleaned {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(case_id = %task.case_id, error = %e, "Clean after run failed"),
            Err(e) => warn!(case_id = %task.case_id, error = %e, "Clean after run failed"),
        }
    }

    match result {
        Ok(()) => CaseReport {
            case_id: task.case_id,
            state: CaseState::Succeeded,
            error: None,
        },
        Err(e) => failed(&task, format!("run failed ({})", e)),
    }
}

fn failed(task: &CaseTask, detail: String) -> CaseReport {
    CaseReport {
        case_id: task.case_id.clone(),
        state: CaseState::Failed,
        error: Some(format!("{}: {}", task.case_id, detail)),
    }
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
}
