//! Bootstrap a gold annotation by running a checker on one variant.
//!
//! The result is a starting point for manual review, written to
//! `<variant>/<variant>.json` as `{case_id, issues}`.

use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::info;

use super::args::ArgValues;
use super::checker::{CaseInvocation, Checker};
use crate::error::VariantError;
use crate::variants::{VariantManager, OUTPUTS_DIR};

/// Materializes `variant_id`, runs `checker` on it and stores the reported
/// issues as the variant's annotation. Returns the annotation path.
pub async fn generate_annotation(
    manager: &VariantManager,
    variant_id: &str,
    checker: &dyn Checker,
    args: &ArgValues,
    force_materialize: bool,
) -> Result<PathBuf, VariantError> {
    let variant_dir = manager.materialize(variant_id, force_materialize)?;
    let case_id = manager.exercise().case_id(variant_id);

    let scratch = TempDir::new()?;
    let output_path = scratch.path().join(format!("{}_result.json", variant_id));
    let invocation = CaseInvocation {
        input_path: variant_dir.clone(),
        output_path: output_path.clone(),
        case_id: case_id.clone(),
        args: args.clone(),
        prefix_output: false,
    };
    checker.run_case(&invocation).await?;

    let data: Value = serde_json::from_str(&std::fs::read_to_string(&output_path)?)?;
    let issues = data
        .get("response")
        .and_then(|r| r.get("issues"))
        .filter(|v| v.is_array())
        .or_else(|| data.get("issues").filter(|v| v.is_array()))
        .cloned()
        .unwrap_or_else(|| json!([]));

    let residual = variant_dir.join(OUTPUTS_DIR);
    if residual.exists() {
        let _ = std::fs::remove_dir_all(&residual);
    }

    let annotation_path = manager.annotation_path(variant_id);
    let mut text = serde_json::to_string_pretty(&json!({
        "case_id": case_id,
        "issues": issues,
    }))?;
    text.push('\n');
    std::fs::write(&annotation_path, text)?;

    info!(case_id = %case_id, path = %annotation_path.display(), "Generated annotation");
    Ok(annotation_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckerError;
    use crate::exercise::ExerciseId;
    use crate::variants::InconsistencyCategory;
    use async_trait::async_trait;

    struct NestedChecker;

    #[async_trait]
    impl Checker for NestedChecker {
        async fn run_case(&self, invocation: &CaseInvocation) -> Result<(), CheckerError> {
            std::fs::create_dir_all(invocation.input_path.join("outputs"))?;
            let payload = json!({
                "case_id": invocation.case_id,
                "response": {"issues": [{"category": "VISIBILITY_MISMATCH", "related_locations": []}]}
            });
            std::fs::write(&invocation.output_path, payload.to_string())?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generate_annotation() {
        let temp = tempfile::TempDir::new().unwrap();
        let exercise = temp.path().join("ITP/H01");
        std::fs::create_dir_all(exercise.join("template")).unwrap();
        std::fs::write(exercise.join("template/A.java"), "class A {}\n").unwrap();

        let manager = VariantManager::open(temp.path(), ExerciseId::new("ITP", "H01")).unwrap();
        let id = manager
            .init_variant(InconsistencyCategory::VisibilityMismatch, "private", None)
            .unwrap();

        let path = generate_annotation(&manager, &id, &NestedChecker, &ArgValues::new(), false)
            .await
            .unwrap();
        let annotation: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(annotation["case_id"], "ITP/H01/001");
        assert_eq!(annotation["issues"].as_array().unwrap().len(), 1);
        assert!(!manager.variant_dir(&id).unwrap().join("outputs").exists());
        assert!(manager.status(&id).unwrap().has_annotation);
    }
}
