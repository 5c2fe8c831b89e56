//! Exercise variants: patches, lifecycle and the category taxonomy.

pub mod category;
pub mod manager;
pub mod patch;

pub use category::{CategoryKind, InconsistencyCategory};
pub use manager::{VariantManager, VariantStatus, OUTPUTS_DIR, VARIANTS_DIR};
pub use patch::{HunkRange, PatchEngine, PatchSummary, BASE_ARTIFACTS};
