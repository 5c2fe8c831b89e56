//! Benchmark runner.
//!
//! Runs an external consistency checker over exercise variants:
//!
//! ```text
//! approach config + CLI extras → ResolvedArgs
//! exercises × variants → CaseTask queue → workers (materialize → checker → clean)
//!                                        → collector (RunStats, run metadata)
//! ```
//!
//! Case outputs land in `results/<approach>/<run>/cases/<course>/<exercise>/<variant>.json`,
//! run metadata in `runs/<approach>/<run>.yaml`.

pub mod annotate;
pub mod args;
pub mod checker;
pub mod config;
pub mod metadata;
pub mod orchestrator;
pub mod progress;

pub use annotate::generate_annotation;
pub use args::{emit_flags, parse_approach_arguments, parse_bool, ArgValues, ResolvedArgs};
pub use checker::{CaseInvocation, Checker, ProcessChecker};
pub use config::{ApproachConfig, ArgSpec, ArgType, ChoiceSpec, DEFAULT_APPROACH_ID};
pub use metadata::{RunCounts, RunMetadata};
pub use orchestrator::{
    CaseState, CaseTask, PreparedRun, RunOrchestrator, RunOutcome, RunRequest, RunStats,
    EXIT_INTERRUPTED,
};
pub use progress::{ProgressCounters, ProgressMonitor};
