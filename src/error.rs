//! Error types for pecv-bench operations.
//!
//! Defines the error taxonomy for every subsystem:
//! - Patch computation and application
//! - Variant lifecycle (materialize / clean / create-patch)
//! - External checker process invocation
//! - Benchmark runs (configuration, resume, scheduling)
//! - Report aggregation
//! - Structured text (YAML / JSON) loading

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while diffing or patching artifact trees.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("diff exited with code {code}: {stderr}")]
    DiffFailed { code: i32, stderr: String },

    #[error("Patch application failed: {output}")]
    ApplyFailed { output: String },

    #[error("Required tool '{0}' is not available on PATH")]
    ToolUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the variant lifecycle manager.
#[derive(Debug, Error)]
pub enum VariantError {
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),

    #[error("Variant {variant_id} missing under {exercise}")]
    VariantNotFound { exercise: String, variant_id: String },

    #[error("Variant {0} already exists")]
    VariantExists(String),

    #[error("Unknown category '{0}'")]
    UnknownCategory(String),

    #[error("Failed to apply patch for {variant_id}: {source}")]
    Materialization {
        variant_id: String,
        #[source]
        source: PatchError,
    },

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Checker error: {0}")]
    Checker(#[from] CheckerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while invoking the external checker process.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Approach configuration is missing an executable entrypoint")]
    EmptyCommand,

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a benchmark run as a whole.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Variant error: {0}")]
    Variant(#[from] VariantError),

    #[error("Checker error: {0}")]
    Checker(#[from] CheckerError),

    #[error("Structured text error: {0}")]
    Structured(#[from] StructuredError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while aggregating persisted case outputs.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Gold annotations missing at {}", path.display())]
    AnnotationMissing { path: PathBuf },

    #[error("Benchmark results not found: {}", .0.display())]
    BenchmarkNotFound(PathBuf),

    #[error("Dataset directory not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Structured text error: {0}")]
    Structured(#[from] StructuredError),
}

/// Errors raised by the YAML / JSON load and dump helpers.
#[derive(Debug, Error)]
pub enum StructuredError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
