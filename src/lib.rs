//! pecv-bench: benchmark harness for programming-exercise consistency checkers.
//!
//! Exercises carry variants with injected inconsistencies, stored as patches
//! against the exercise base. A checker under evaluation runs on each
//! materialized variant and its reported issues are scored against gold
//! annotations at line granularity.

pub mod cli;
pub mod context;
pub mod error;
pub mod exercise;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod utils;
pub mod variants;

pub use context::BenchContext;
pub use error::{CheckerError, PatchError, ReportError, RunError, StructuredError, VariantError};
pub use exercise::ExerciseId;
