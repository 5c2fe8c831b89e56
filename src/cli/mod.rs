//! Command-line interface for pecv-bench.
//!
//! Provides commands for variant management, benchmark runs and reporting.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
