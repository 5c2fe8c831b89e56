//! Variant lifecycle: initialise, patch, materialise and clean.
//!
//! A variant lives at `<data>/<course>/<exercise>/variants/<id>/` and holds:
//! - `<id>.patch`: unified diff against the exercise base artifacts
//! - `<id>.json`: gold annotation
//! - `<id>.<CATEGORY>.md`: description, first line is the summary
//! - `outputs/`: results of earlier checker runs
//!
//! Materialising copies the base artifacts next to these files and applies
//! the patch. Cleaning removes them again.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::category::InconsistencyCategory;
use super::patch::{copy_artifact, remove_artifact, PatchEngine, BASE_ARTIFACTS};
use crate::error::VariantError;
use crate::exercise::ExerciseId;

/// Directory holding all variants of an exercise.
pub const VARIANTS_DIR: &str = "variants";
/// Per-variant directory for checker outputs.
pub const OUTPUTS_DIR: &str = "outputs";

/// Snapshot of one variant directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStatus {
    pub variant_id: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub has_patch: bool,
    pub has_annotation: bool,
    pub is_materialized: bool,
    pub outputs_count: usize,
}

/// Manages the variants of a single exercise.
#[derive(Debug, Clone)]
pub struct VariantManager {
    exercise: ExerciseId,
    exercise_path: PathBuf,
    variants_path: PathBuf,
    engine: PatchEngine,
}

impl VariantManager {
    /// Opens the exercise under `data_root`, creating its `variants/` directory.
    pub fn open(data_root: &Path, exercise: ExerciseId) -> Result<Self, VariantError> {
        let exercise_path = data_root.join(exercise.relative());
        if !exercise_path.is_dir() {
            return Err(VariantError::ExerciseNotFound(
                exercise_path.display().to_string(),
            ));
        }
        let variants_path = exercise_path.join(VARIANTS_DIR);
        fs::create_dir_all(&variants_path)?;

        Ok(Self {
            exercise,
            exercise_path,
            variants_path,
            engine: PatchEngine::new(),
        })
    }

    /// Replaces the patch engine.
    pub fn with_engine(mut self, engine: PatchEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn exercise(&self) -> &ExerciseId {
        &self.exercise
    }

    pub fn exercise_path(&self) -> &Path {
        &self.exercise_path
    }

    pub fn variants_path(&self) -> &Path {
        &self.variants_path
    }

    /// Returns the variant directory, failing if it does not exist.
    pub fn variant_dir(&self, variant_id: &str) -> Result<PathBuf, VariantError> {
        let path = self.variants_path.join(variant_id);
        if !path.is_dir() {
            return Err(VariantError::VariantNotFound {
                exercise: self.exercise.to_string(),
                variant_id: variant_id.to_string(),
            });
        }
        Ok(path)
    }

    pub fn patch_path(&self, variant_id: &str) -> PathBuf {
        self.variants_path
            .join(variant_id)
            .join(format!("{}.patch", variant_id))
    }

    pub fn annotation_path(&self, variant_id: &str) -> PathBuf {
        self.variants_path
            .join(variant_id)
            .join(format!("{}.json", variant_id))
    }

    /// Sorted ids of every variant directory.
    pub fn variant_ids(&self) -> Result<Vec<String>, VariantError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.variants_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Status of every variant, sorted by id.
    pub fn list_variants(&self) -> Result<Vec<VariantStatus>, VariantError> {
        self.variant_ids()?
            .into_iter()
            .map(|id| self.status(&id))
            .collect()
    }

    /// Status of a single variant.
    pub fn status(&self, variant_id: &str) -> Result<VariantStatus, VariantError> {
        let dir = self.variant_dir(variant_id)?;
        let (category, description) = match find_description_file(&dir, variant_id)? {
            Some((category, path)) => {
                let content = fs::read_to_string(&path)?;
                let first_line = content.trim().lines().next().unwrap_or_default().trim();
                let description = (!first_line.is_empty()).then(|| first_line.to_string());
                (Some(category), description)
            }
            None => (None, None),
        };

        let patch_path = self.patch_path(variant_id);
        let has_patch = patch_path.is_file() && fs::metadata(&patch_path)?.len() > 0;

        Ok(VariantStatus {
            variant_id: variant_id.to_string(),
            category,
            description,
            has_patch,
            has_annotation: self.annotation_path(variant_id).is_file(),
            is_materialized: is_materialized(&dir),
            outputs_count: count_outputs(&dir.join(OUTPUTS_DIR))?,
        })
    }

    /// Next free zero-padded numeric id (`001`, `002`, ...).
    pub fn next_variant_id(&self) -> Result<String, VariantError> {
        let highest = self
            .variant_ids()?
            .iter()
            .filter_map(|id| id.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{:03}", highest + 1))
    }

    /// Creates a new variant from the base artifacts and writes its
    /// description file. Returns the variant id.
    pub fn init_variant(
        &self,
        category: InconsistencyCategory,
        description: &str,
        variant_id: Option<&str>,
    ) -> Result<String, VariantError> {
        let variant_id = match variant_id {
            Some(id) => id.to_string(),
            None => self.next_variant_id()?,
        };
        let dir = self.variants_path.join(&variant_id);
        if dir.exists() {
            return Err(VariantError::VariantExists(variant_id));
        }
        fs::create_dir_all(&dir)?;

        for name in BASE_ARTIFACTS {
            let src = self.exercise_path.join(name);
            if src.exists() {
                copy_artifact(&src, &dir.join(name))?;
            }
        }

        let description_path = dir.join(format!("{}.{}.md", variant_id, category));
        fs::write(&description_path, format!("{}\n", description.trim()))?;

        info!(
            exercise = %self.exercise,
            variant_id = %variant_id,
            category = %category,
            "Initialised variant"
        );
        Ok(variant_id)
    }

    /// Diffs the variant's current artifacts against the exercise base and
    /// stores the result as `<id>.patch`, overwriting any previous patch.
    pub fn create_patch(&self, variant_id: &str) -> Result<PathBuf, VariantError> {
        let dir = self.variant_dir(variant_id)?;
        let patch = self.engine.diff(&self.exercise_path, &dir)?;
        let patch_path = self.patch_path(variant_id);
        fs::write(&patch_path, &patch)?;

        if patch.is_empty() {
            warn!(variant_id = %variant_id, "Variant matches the base exercise, wrote empty patch");
        } else {
            info!(variant_id = %variant_id, path = %patch_path.display(), "Patch created");
        }
        Ok(patch_path)
    }

    /// Brings the variant directory into a runnable state.
    ///
    /// A variant whose `template` artifact is present counts as materialized
    /// and is left alone unless `force` is set, so artifacts deleted by the
    /// patch are not restored and the patch is never applied twice. If the
    /// patch does not apply the copied artifacts are removed again before the
    /// error is returned.
    pub fn materialize(&self, variant_id: &str, force: bool) -> Result<PathBuf, VariantError> {
        let dir = self.variant_dir(variant_id)?;
        if force {
            self.clean(variant_id, true)?;
        } else if is_materialized(&dir) {
            debug!(variant_id = %variant_id, "Variant already materialized");
            return Ok(dir);
        }

        let mut copied_any = false;
        for name in BASE_ARTIFACTS {
            let src = self.exercise_path.join(name);
            let dst = dir.join(name);
            if src.exists() && !dst.exists() {
                copy_artifact(&src, &dst)?;
                copied_any = true;
            }
        }

        let patch_path = self.patch_path(variant_id);
        if copied_any && patch_path.is_file() {
            let patch = fs::read_to_string(&patch_path)?;
            if !patch.trim().is_empty() {
                if let Err(source) = self.engine.apply(&dir, &patch) {
                    if let Err(e) = self.clean(variant_id, true) {
                        warn!(variant_id = %variant_id, error = %e, "Rollback after failed patch did not complete");
                    }
                    return Err(VariantError::Materialization {
                        variant_id: variant_id.to_string(),
                        source,
                    });
                }
            }
        }

        debug!(variant_id = %variant_id, copied = copied_any, "Variant materialized");
        Ok(dir)
    }

    /// Removes materialized artifacts and patch leftovers. Outputs are removed
    /// too unless `keep_outputs` is set.
    pub fn clean(&self, variant_id: &str, keep_outputs: bool) -> Result<(), VariantError> {
        let dir = self.variant_dir(variant_id)?;
        for name in BASE_ARTIFACTS {
            remove_artifact(&dir.join(name))?;
        }
        if !keep_outputs {
            remove_artifact(&dir.join(OUTPUTS_DIR))?;
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let stray = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("rej") | Some("orig")
            );
            if stray && path.is_file() {
                remove_artifact(&path)?;
            }
        }

        debug!(variant_id = %variant_id, keep_outputs, "Variant cleaned");
        Ok(())
    }
}

fn find_description_file(
    dir: &Path,
    variant_id: &str,
) -> Result<Option<(String, PathBuf)>, VariantError> {
    let prefix = format!("{}.", variant_id);
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // `<id>.<CATEGORY>[.anything].md`
        if let Some(category) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".md"))
            .and_then(|stem| stem.split('.').next())
        {
            if !category.is_empty() && path.is_file() {
                candidates.push((category.to_string(), path.clone()));
            }
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn is_materialized(dir: &Path) -> bool {
    dir.join("template").exists()
}

fn count_outputs(outputs_dir: &Path) -> std::io::Result<usize> {
    if !outputs_dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(outputs_dir)? {
        let name = entry?.file_name();
        if name.to_string_lossy().ends_with("_result.json") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn setup() -> (TempDir, VariantManager) {
        let temp = TempDir::new().unwrap();
        let exercise_root = temp.path().join("ITP/H01E01-Lectures");
        write(&exercise_root.join("problem-statement.md"), "# Lectures\nAdd a getter.\n");
        write(
            &exercise_root.join("solution/src/Lecture.java"),
            "public class Lecture {\n    public String getTitle() { return title; }\n}\n",
        );
        write(&exercise_root.join("template/src/Lecture.java"), "public class Lecture {\n}\n");
        write(&exercise_root.join("tests/LectureTest.java"), "class LectureTest {}\n");
        write(&exercise_root.join("exercise-details.json"), "{}\n");

        let manager =
            VariantManager::open(temp.path(), ExerciseId::new("ITP", "H01E01-Lectures")).unwrap();
        (temp, manager)
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap().display().to_string();
                (rel, fs::read(e.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_open_missing_exercise() {
        let temp = TempDir::new().unwrap();
        let err = VariantManager::open(temp.path(), ExerciseId::new("X", "Y")).unwrap_err();
        assert!(matches!(err, VariantError::ExerciseNotFound(_)));
    }

    #[test]
    fn test_init_and_list() {
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(
                InconsistencyCategory::VisibilityMismatch,
                "getTitle is private in the template\nmore detail",
                None,
            )
            .unwrap();
        assert_eq!(id, "001");
        assert_eq!(manager.next_variant_id().unwrap(), "002");

        let err = manager
            .init_variant(InconsistencyCategory::VisibilityMismatch, "again", Some("001"))
            .unwrap_err();
        assert!(matches!(err, VariantError::VariantExists(_)));

        let statuses = manager.list_variants().unwrap();
        assert_eq!(statuses.len(), 1);
        let status = &statuses[0];
        assert_eq!(status.category.as_deref(), Some("VISIBILITY_MISMATCH"));
        assert_eq!(
            status.description.as_deref(),
            Some("getTitle is private in the template")
        );
        assert!(status.is_materialized);
        assert!(!status.has_patch);
        assert!(!status.has_annotation);
        assert_eq!(status.outputs_count, 0);
    }

    #[test]
    fn test_missing_variant() {
        let (_temp, manager) = setup();
        assert!(matches!(
            manager.materialize("042", false).unwrap_err(),
            VariantError::VariantNotFound { .. }
        ));
        assert!(matches!(
            manager.clean("042", false).unwrap_err(),
            VariantError::VariantNotFound { .. }
        ));
    }

    #[test]
    fn test_clean_removes_artifacts_and_strays() {
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(InconsistencyCategory::AttributeTypeMismatch, "desc", None)
            .unwrap();
        let dir = manager.variant_dir(&id).unwrap();
        write(&dir.join("outputs/run_result.json"), "{}");
        write(&dir.join("Lecture.java.rej"), "reject");
        write(&dir.join("problem-statement.md.orig"), "orig");
        assert_eq!(manager.status(&id).unwrap().outputs_count, 1);

        manager.clean(&id, true).unwrap();
        assert!(!dir.join("template").exists());
        assert!(!dir.join("problem-statement.md").exists());
        assert!(!dir.join("Lecture.java.rej").exists());
        assert!(!dir.join("problem-statement.md.orig").exists());
        assert!(dir.join("outputs").exists());
        assert!(dir.join(format!("{}.ATTRIBUTE_TYPE_MISMATCH.md", id)).exists());

        manager.clean(&id, false).unwrap();
        assert!(!dir.join("outputs").exists());
        // Cleaning twice is fine
        manager.clean(&id, false).unwrap();
    }

    #[test]
    fn test_create_patch_and_materialize() {
        if !PatchEngine::tools_available() {
            return;
        }
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(InconsistencyCategory::VisibilityMismatch, "private getter", None)
            .unwrap();
        let dir = manager.variant_dir(&id).unwrap();
        write(
            &dir.join("solution/src/Lecture.java"),
            "public class Lecture {\n    private String getTitle() { return title; }\n}\n",
        );
        let patch_path = manager.create_patch(&id).unwrap();
        assert!(fs::read_to_string(&patch_path).unwrap().contains("private String getTitle"));
        let expected = snapshot(&dir);

        manager.clean(&id, false).unwrap();
        assert!(!manager.status(&id).unwrap().is_materialized);
        assert!(manager.status(&id).unwrap().has_patch);

        manager.materialize(&id, false).unwrap();
        assert_eq!(snapshot(&dir), expected);

        // Second call without force does not re-apply the patch
        manager.materialize(&id, false).unwrap();
        assert_eq!(snapshot(&dir), expected);

        manager.materialize(&id, true).unwrap();
        let first = snapshot(&dir);
        manager.materialize(&id, true).unwrap();
        assert_eq!(snapshot(&dir), first);
        assert_eq!(first, expected);
    }

    #[test]
    fn test_materialize_twice_with_deleted_artifact() {
        if !PatchEngine::tools_available() {
            return;
        }
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(InconsistencyCategory::VisibilityMismatch, "no details", None)
            .unwrap();
        let dir = manager.variant_dir(&id).unwrap();
        write(
            &dir.join("solution/src/Lecture.java"),
            "public class Lecture {\n    private String getTitle() { return title; }\n}\n",
        );
        fs::remove_file(dir.join("exercise-details.json")).unwrap();
        manager.create_patch(&id).unwrap();
        manager.clean(&id, false).unwrap();

        manager.materialize(&id, false).unwrap();
        let first = snapshot(&dir);
        manager.materialize(&id, false).unwrap();
        assert_eq!(snapshot(&dir), first);

        for name in ["template", "solution", "tests", "problem-statement.md"] {
            assert!(dir.join(name).exists(), "{} missing", name);
        }
        assert!(fs::read_to_string(dir.join("solution/src/Lecture.java"))
            .unwrap()
            .contains("private String getTitle"));
        let details = fs::read_to_string(dir.join("exercise-details.json")).unwrap_or_default();
        assert!(details.trim().is_empty());
    }

    #[test]
    fn test_description_with_extra_suffix() {
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(InconsistencyCategory::VisibilityMismatch, "first", None)
            .unwrap();
        let dir = manager.variant_dir(&id).unwrap();
        fs::rename(
            dir.join(format!("{}.VISIBILITY_MISMATCH.md", id)),
            dir.join(format!("{}.VISIBILITY_MISMATCH.draft.md", id)),
        )
        .unwrap();
        let status = manager.status(&id).unwrap();
        assert_eq!(status.category.as_deref(), Some("VISIBILITY_MISMATCH"));
        assert_eq!(status.description.as_deref(), Some("first"));
    }

    #[test]
    fn test_failed_patch_rolls_back() {
        if !PatchEngine::tools_available() {
            return;
        }
        let (_temp, manager) = setup();
        let id = manager
            .init_variant(InconsistencyCategory::MethodReturnTypeMismatch, "broken", None)
            .unwrap();
        manager.clean(&id, true).unwrap();
        fs::write(
            manager.patch_path(&id),
            "\
diff -ruN a/problem-statement.md b/problem-statement.md
--- a/problem-statement.md
+++ b/problem-statement.md
@@ -1,2 +1,2 @@
 # Something
-that is not there
+replacement
",
        )
        .unwrap();

        let err = manager.materialize(&id, false).unwrap_err();
        match &err {
            VariantError::Materialization { variant_id, .. } => assert_eq!(variant_id, &id),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with(&format!("Failed to apply patch for {}", id)));

        let dir = manager.variant_dir(&id).unwrap();
        for name in BASE_ARTIFACTS {
            assert!(!dir.join(name).exists(), "{} left behind", name);
        }
        assert!(!manager.status(&id).unwrap().is_materialized);
    }
}
