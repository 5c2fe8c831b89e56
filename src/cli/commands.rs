//! CLI command definitions for pecv-bench.
//!
//! Three command groups: `variants` manages the dataset, `run-benchmark`
//! executes a checker over it and `report` aggregates the results.

use crate::context::BenchContext;
use crate::exercise::{iter_exercises, ExerciseId};
use crate::report::{generate_report, ReportOptions};
use crate::runner::{
    generate_annotation, parse_approach_arguments, ApproachConfig, ProcessChecker,
    RunOrchestrator, RunRequest, DEFAULT_APPROACH_ID,
};
use crate::variants::{InconsistencyCategory, VariantManager};
use anyhow::Context;
use clap::Parser;
use indexmap::IndexMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Benchmark harness for programming-exercise consistency checkers.
#[derive(Parser)]
#[command(name = "pecv-bench")]
#[command(about = "Manage exercise variants, run consistency checkers and report results")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Benchmark repository root.
    #[arg(long, env = "PECV_BENCH_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Manage inconsistency variants of exercises.
    Variants(VariantsArgs),

    /// Run a checker over the dataset.
    ///
    /// Arguments after `--` are parsed against the approach's argument schema.
    #[command(name = "run-benchmark", alias = "run")]
    RunBenchmark(RunBenchmarkArgs),

    /// Score runs against gold annotations and write summaries.
    Report(ReportArgs),
}

#[derive(Parser, Debug)]
pub struct VariantsArgs {
    #[command(subcommand)]
    pub command: VariantsSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum VariantsSubcommand {
    /// List variants and their status.
    List {
        /// Course/exercise path; all exercises when omitted.
        #[arg(short, long)]
        exercise: Option<String>,
    },

    /// Initialise a new variant stub.
    Init {
        #[arg(short, long)]
        exercise: String,
        #[arg(short, long)]
        category: InconsistencyCategory,
        #[arg(short, long)]
        description: String,
        /// Variant id; the next free id when omitted.
        #[arg(short, long)]
        variant: Option<String>,
        /// Create the variant but leave artifacts dematerialized.
        #[arg(long)]
        skip_materialize: bool,
        /// Recreate artifacts even if they already exist.
        #[arg(long)]
        force_materialize: bool,
    },

    /// Write the variant's patch against the exercise base.
    CreatePatch {
        #[arg(short, long)]
        exercise: String,
        #[arg(short, long)]
        variant: String,
    },

    /// Materialize a single variant.
    Materialize {
        #[arg(short, long)]
        exercise: String,
        #[arg(short, long)]
        variant: String,
        #[arg(long)]
        force: bool,
    },

    /// Materialize all variants.
    MaterializeAll {
        /// Restrict to a specific exercise.
        #[arg(short, long)]
        exercise: Option<String>,
        #[arg(long)]
        force: bool,
    },

    /// Remove materialized artifacts of a variant.
    Clean {
        #[arg(short, long)]
        exercise: String,
        #[arg(short, long)]
        variant: String,
        /// Preserve the outputs directory.
        #[arg(long)]
        keep_outputs: bool,
    },

    /// Remove materialized artifacts of all variants.
    CleanAll {
        #[arg(short, long)]
        exercise: Option<String>,
        #[arg(long)]
        keep_outputs: bool,
    },

    /// Bootstrap the gold annotation by running an approach on the variant.
    GenerateAnnotation {
        #[arg(short, long)]
        exercise: String,
        #[arg(short, long)]
        variant: String,
        /// Approach configuration; `configs/pecv-reference.yaml` by default.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Re-materialize the variant before running.
        #[arg(long)]
        force_materialize: bool,
        /// Approach arguments.
        #[arg(last = true)]
        approach_args: Vec<String>,
    },
}

#[derive(Parser, Debug)]
pub struct RunBenchmarkArgs {
    /// Approach identifier; same as `--approach`.
    pub approach_name: Option<String>,

    /// Approach configuration file (YAML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the approach identifier from the config.
    #[arg(long)]
    pub approach: Option<String>,

    /// Exercise path (course/exercise). Repeatable.
    #[arg(long)]
    pub exercise: Vec<String>,

    /// Variant identifier (requires exactly one --exercise). Repeatable.
    #[arg(long)]
    pub variant: Vec<String>,

    /// Explicit run identifier; generated when omitted.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Skip cases whose result file already exists.
    #[arg(long)]
    pub skip_existing: bool,

    /// Re-materialize variants before running.
    #[arg(long)]
    pub force_materialize: bool,

    /// Clean materialized artifacts after each case.
    #[arg(long)]
    pub clean_after: bool,

    /// Preserve per-variant outputs when cleaning.
    #[arg(long)]
    pub keep_outputs: bool,

    /// Maximum number of cases executed in parallel.
    #[arg(long, default_value = "1")]
    pub max_concurrency: usize,

    /// Run metadata file, or a run id, to resume.
    #[arg(long)]
    pub resume_run: Option<String>,

    /// Run id under `runs/<approach>/` to resume if present.
    #[arg(long)]
    pub resume_run_id: Option<String>,

    /// Approach arguments.
    #[arg(last = true)]
    pub approach_args: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Benchmark name under the results directory.
    #[arg(long, default_value = DEFAULT_APPROACH_ID)]
    pub benchmark: String,

    /// Results root; `<root>/results` by default.
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Run metadata root; `<root>/runs` by default.
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Subdirectory of the benchmark results receiving the summaries.
    #[arg(long)]
    pub aggregate_dir: Option<String>,
}

impl RunBenchmarkArgs {
    fn into_request(self, ctx: &BenchContext) -> RunRequest {
        RunRequest {
            config_path: self.config.map(|p| ctx.resolve(p)),
            approach: self.approach.or(self.approach_name),
            exercises: self.exercise,
            variants: self.variant,
            run_id: self.run_id,
            skip_existing: self.skip_existing,
            force_materialize: self.force_materialize,
            clean_after: self.clean_after,
            keep_outputs: self.keep_outputs,
            max_concurrency: self.max_concurrency,
            resume_run: self.resume_run,
            resume_run_id: self.resume_run_id,
            extra_args: self.approach_args,
        }
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments and return the process exit code.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    let ctx = BenchContext::new(cli.root);
    match cli.command {
        Commands::Variants(args) => run_variants_command(&ctx, args.command).await,
        Commands::RunBenchmark(args) => run_benchmark_command(ctx, args).await,
        Commands::Report(args) => run_report_command(&ctx, args),
    }
}

fn parse_exercise(value: &str) -> anyhow::Result<ExerciseId> {
    ExerciseId::parse(value).map_err(|e| anyhow::anyhow!(e))
}

fn resolve_exercises(ctx: &BenchContext, exercise: Option<&str>) -> anyhow::Result<Vec<ExerciseId>> {
    match exercise {
        Some(value) => Ok(vec![parse_exercise(value)?]),
        None => iter_exercises(&ctx.data_root)
            .with_context(|| format!("Failed to scan {}", ctx.data_root.display())),
    }
}

fn open_manager(ctx: &BenchContext, exercise: &str) -> anyhow::Result<VariantManager> {
    Ok(VariantManager::open(&ctx.data_root, parse_exercise(exercise)?)?)
}

// ============================================================================
// Variants
// ============================================================================

async fn run_variants_command(
    ctx: &BenchContext,
    command: VariantsSubcommand,
) -> anyhow::Result<i32> {
    match command {
        VariantsSubcommand::List { exercise } => {
            let exercises = resolve_exercises(ctx, exercise.as_deref())?;
            for (idx, exercise) in exercises.iter().enumerate() {
                let manager = VariantManager::open(&ctx.data_root, exercise.clone())?;
                let statuses = manager.list_variants()?;
                if exercises.len() > 1 {
                    if idx > 0 {
                        println!();
                    }
                    println!("== {} ==", exercise);
                }
                if statuses.is_empty() {
                    println!("No variants yet.");
                }
                for status in statuses {
                    let mut flags = vec![
                        if status.has_patch { "patch" } else { "missing patch" }.to_string(),
                        if status.has_annotation {
                            "annotation"
                        } else {
                            "missing annotation"
                        }
                        .to_string(),
                        if status.is_materialized {
                            "materialized"
                        } else {
                            "not materialized"
                        }
                        .to_string(),
                    ];
                    if status.outputs_count > 0 {
                        flags.push(format!("{} outputs", status.outputs_count));
                    }
                    let category = status.category.as_deref().unwrap_or("UNKNOWN");
                    let description = status
                        .description
                        .as_deref()
                        .map(|d| format!(" - {}", d))
                        .unwrap_or_default();
                    println!(
                        "- {} [{}]: {}{}",
                        status.variant_id,
                        category,
                        flags.join(", "),
                        description
                    );
                }
            }
        }
        VariantsSubcommand::Init {
            exercise,
            category,
            description,
            variant,
            skip_materialize,
            force_materialize,
        } => {
            let manager = open_manager(ctx, &exercise)?;
            let variant_id = manager.init_variant(category, &description, variant.as_deref())?;
            if skip_materialize {
                println!("Initialized variant {} under {}", variant_id, manager.exercise());
            } else {
                manager.materialize(&variant_id, force_materialize)?;
                println!(
                    "Initialized and materialized variant {} under {}",
                    variant_id,
                    manager.exercise()
                );
            }
        }
        VariantsSubcommand::CreatePatch { exercise, variant } => {
            let manager = open_manager(ctx, &exercise)?;
            let path = manager.create_patch(&variant)?;
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                println!("No differences detected; created empty patch at {}", path.display());
            } else {
                println!("Generated patch at {}", path.display());
            }
        }
        VariantsSubcommand::Materialize {
            exercise,
            variant,
            force,
        } => {
            let manager = open_manager(ctx, &exercise)?;
            manager.materialize(&variant, force)?;
            println!("Materialized variant {} under {}", variant, manager.exercise());
        }
        VariantsSubcommand::MaterializeAll { exercise, force } => {
            let mut failures = 0usize;
            for exercise in resolve_exercises(ctx, exercise.as_deref())? {
                let manager = VariantManager::open(&ctx.data_root, exercise)?;
                println!("==> {}", manager.exercise());
                for variant_id in manager.variant_ids()? {
                    match manager.materialize(&variant_id, force) {
                        Ok(_) => println!("  materialized {}", variant_id),
                        Err(e) => {
                            failures += 1;
                            warn!(variant = %variant_id, error = %e, "Materialization failed");
                            println!("  {}: {}", variant_id, e);
                        }
                    }
                }
            }
            if failures > 0 {
                info!(failures, "Some variants failed to materialize");
            }
        }
        VariantsSubcommand::Clean {
            exercise,
            variant,
            keep_outputs,
        } => {
            let manager = open_manager(ctx, &exercise)?;
            manager.clean(&variant, keep_outputs)?;
            println!("Cleaned materialized artifacts for variant {}", variant);
        }
        VariantsSubcommand::CleanAll {
            exercise,
            keep_outputs,
        } => {
            for exercise in resolve_exercises(ctx, exercise.as_deref())? {
                let manager = VariantManager::open(&ctx.data_root, exercise)?;
                println!("==> {}", manager.exercise());
                for variant_id in manager.variant_ids()? {
                    manager.clean(&variant_id, keep_outputs)?;
                    println!("  cleaned {}", variant_id);
                }
            }
        }
        VariantsSubcommand::GenerateAnnotation {
            exercise,
            variant,
            config,
            force_materialize,
            approach_args,
        } => {
            let manager = open_manager(ctx, &exercise)?;
            let config_path = config
                .map(|p| ctx.resolve(p))
                .unwrap_or_else(|| ctx.default_config_path());
            let approach = ApproachConfig::load(&config_path)?;
            let args = parse_approach_arguments(&approach, &approach_args, &IndexMap::new())?;
            let checker = ProcessChecker::from_config(&approach)?
                .with_pythonpath(ctx.reference_root.clone());
            let path = generate_annotation(
                &manager,
                &variant,
                &checker,
                &args.values,
                force_materialize,
            )
            .await?;
            println!("Generated annotation at {}", path.display());
        }
    }
    Ok(0)
}

// ============================================================================
// Benchmark run
// ============================================================================

async fn run_benchmark_command(ctx: BenchContext, args: RunBenchmarkArgs) -> anyhow::Result<i32> {
    let request = args.into_request(&ctx);
    let orchestrator = RunOrchestrator::new(ctx);

    let (tx, rx) = mpsc::channel(4);
    let signals = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let result = orchestrator.run(&request, rx).await;
    signals.abort();
    let outcome = result?;

    println!(
        "Run {} ({}): executed={} skipped={} failed={}",
        outcome.run_id,
        outcome.approach_id,
        outcome.stats.executed,
        outcome.stats.skipped,
        outcome.stats.failed
    );
    for error in &outcome.errors {
        println!("  {}", error);
    }
    if outcome.interrupted {
        println!("Run interrupted; resume with --resume-run {}", outcome.run_id);
    }
    println!("Run metadata: {}", outcome.metadata_path.display());
    Ok(outcome.exit_code())
}

// ============================================================================
// Report
// ============================================================================

fn run_report_command(ctx: &BenchContext, args: ReportArgs) -> anyhow::Result<i32> {
    let mut options = ReportOptions::new(ctx).with_benchmark(args.benchmark);
    if let Some(dir) = args.results_dir {
        options = options.with_results_root(ctx.resolve(dir));
    }
    if let Some(dir) = args.runs_dir {
        options = options.with_runs_root(ctx.resolve(dir));
    }
    if let Some(dir) = args.aggregate_dir {
        options = options.with_aggregate_dir(dir);
    }

    let outcome = generate_report(&options, chrono::Utc::now())?;
    for report in &outcome.run_reports {
        println!(
            "{}: cases={} precision={:.3} recall={:.3} f1={:.3}",
            report.run_id,
            report.totals.cases,
            report.totals.precision,
            report.totals.recall,
            report.totals.f1
        );
    }
    println!("Summary JSON: {}", outcome.summary_json.display());
    println!("Summary Markdown: {}", outcome.summary_md.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_benchmark_defaults() {
        let cli = Cli::try_parse_from(["pecv-bench", "run-benchmark"]).expect("should parse");
        match cli.command {
            Commands::RunBenchmark(args) => {
                assert_eq!(args.max_concurrency, 1);
                assert!(args.approach_name.is_none());
                assert!(args.exercise.is_empty());
                assert!(args.approach_args.is_empty());
                assert!(!args.skip_existing);
            }
            _ => panic!("Expected RunBenchmark command"),
        }
    }

    #[test]
    fn test_run_benchmark_with_extras() {
        let cli = Cli::try_parse_from([
            "pecv-bench",
            "run-benchmark",
            "my-approach",
            "--exercise",
            "ITP/H01",
            "--variant",
            "001",
            "--variant",
            "002",
            "--max-concurrency",
            "4",
            "--",
            "--model",
            "gpt",
        ])
        .expect("should parse");
        match cli.command {
            Commands::RunBenchmark(args) => {
                let request = args.into_request(&BenchContext::new("/bench"));
                assert_eq!(request.approach.as_deref(), Some("my-approach"));
                assert_eq!(request.exercises, vec!["ITP/H01"]);
                assert_eq!(request.variants, vec!["001", "002"]);
                assert_eq!(request.max_concurrency, 4);
                assert_eq!(request.extra_args, vec!["--model", "gpt"]);
            }
            _ => panic!("Expected RunBenchmark command"),
        }
    }

    #[test]
    fn test_approach_flag_wins_over_positional() {
        let cli = Cli::try_parse_from([
            "pecv-bench",
            "run-benchmark",
            "positional",
            "--approach",
            "flag",
        ])
        .expect("should parse");
        match cli.command {
            Commands::RunBenchmark(args) => {
                let request = args.into_request(&BenchContext::new("/bench"));
                assert_eq!(request.approach.as_deref(), Some("flag"));
            }
            _ => panic!("Expected RunBenchmark command"),
        }
    }

    #[test]
    fn test_variants_init_category() {
        let cli = Cli::try_parse_from([
            "pecv-bench",
            "variants",
            "init",
            "-e",
            "ITP/H01",
            "-c",
            "VISIBILITY_MISMATCH",
            "-d",
            "make field private",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Variants(VariantsArgs {
                command: VariantsSubcommand::Init { category, variant, .. },
            }) => {
                assert_eq!(category, InconsistencyCategory::VisibilityMismatch);
                assert!(variant.is_none());
            }
            _ => panic!("Expected variants init"),
        }

        assert!(Cli::try_parse_from([
            "pecv-bench", "variants", "init", "-e", "ITP/H01", "-c", "BOGUS", "-d", "x",
        ])
        .is_err());
    }

    #[test]
    fn test_report_defaults() {
        let cli = Cli::try_parse_from(["pecv-bench", "report"]).expect("should parse");
        match cli.command {
            Commands::Report(args) => {
                assert_eq!(args.benchmark, DEFAULT_APPROACH_ID);
                assert!(args.aggregate_dir.is_none());
            }
            _ => panic!("Expected Report command"),
        }
    }

    #[tokio::test]
    async fn test_variants_list_on_empty_dataset() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("data/ITP/H01")).unwrap();
        let cli = Cli::try_parse_from([
            "pecv-bench",
            "--root",
            temp.path().to_str().unwrap(),
            "variants",
            "list",
        ])
        .expect("should parse");
        assert_eq!(run_with_cli(cli).await.unwrap(), 0);
    }
}
