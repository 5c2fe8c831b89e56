//! Shared utility functions for pecv-bench.
//!
//! Structured text (YAML / JSON) persistence and small text helpers used by
//! the variant, runner and report modules.

pub mod structured;
pub mod text;

pub use structured::{dump_structured, load_structured, StructuredFormat};
pub use text::{slugify, split_command_line};
