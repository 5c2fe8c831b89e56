//! Dataset statistics for the summary report.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ReportError;
use crate::variants::{PatchEngine, VARIANTS_DIR};

/// Line totals over all variant patches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PatchTotals {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
    pub files_changed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PatchAverages {
    pub additions: f64,
    pub deletions: f64,
    pub modifications: f64,
    pub files_changed: f64,
}

/// Where and how much the injected inconsistencies change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InjectionAnalysis {
    pub repositories_affected: BTreeMap<String, usize>,
    pub file_types_affected: BTreeMap<String, usize>,
    pub injection_patterns: BTreeMap<String, usize>,
    pub total_changes: PatchTotals,
    pub avg_changes_per_variant: PatchAverages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetSummary {
    /// course -> exercise -> annotated variants
    pub variants_per_course: BTreeMap<String, BTreeMap<String, usize>>,
    /// `course/exercise` -> annotated variants
    pub variants_per_exercise: BTreeMap<String, usize>,
    pub total_annotated_variants: usize,
    pub total_issues: usize,
    pub issues_per_category: BTreeMap<String, usize>,
    /// Counted once per issue for each distinct location type.
    pub issues_per_artifact: BTreeMap<String, usize>,
    pub injection_analysis: InjectionAnalysis,
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walks `<data>/<course>/<exercise>/variants/<id>/` and summarises every
/// annotated variant. `included` restricts the walk to those exercise names.
pub fn summarise_dataset(
    data_root: &Path,
    included: Option<&BTreeSet<String>>,
) -> Result<DatasetSummary, ReportError> {
    if !data_root.exists() {
        return Err(ReportError::DatasetNotFound(data_root.to_path_buf()));
    }

    let mut summary = DatasetSummary::default();
    let injection = &mut summary.injection_analysis;

    for course_dir in sorted_subdirs(data_root)? {
        let course = dir_name(&course_dir);
        let course_counts = summary.variants_per_course.entry(course.clone()).or_default();

        for exercise_dir in sorted_subdirs(&course_dir)? {
            let exercise = dir_name(&exercise_dir);
            if included.is_some_and(|set| !set.is_empty() && !set.contains(&exercise)) {
                continue;
            }
            let variants_dir = exercise_dir.join(VARIANTS_DIR);
            if !variants_dir.is_dir() {
                continue;
            }
            let exercise_key = format!("{}/{}", course, exercise);

            for variant_dir in sorted_subdirs(&variants_dir)? {
                let variant = dir_name(&variant_dir);
                let gold_path = variant_dir.join(format!("{}.json", variant));
                if !gold_path.is_file() {
                    continue;
                }

                summary.total_annotated_variants += 1;
                *summary
                    .variants_per_exercise
                    .entry(exercise_key.clone())
                    .or_insert(0) += 1;
                *course_counts.entry(exercise.clone()).or_insert(0) += 1;

                let annotation: Value = match fs::read_to_string(&gold_path)
                    .ok()
                    .and_then(|text| serde_json::from_str(&text).ok())
                {
                    Some(value) => value,
                    None => {
                        warn!(path = %gold_path.display(), "Unreadable gold annotation");
                        continue;
                    }
                };

                let issues = annotation
                    .get("issues")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                summary.total_issues += issues.len();
                for issue in &issues {
                    if let Some(category) = issue
                        .get("category")
                        .and_then(|c| c.as_str())
                        .filter(|c| !c.is_empty())
                    {
                        *summary
                            .issues_per_category
                            .entry(category.to_string())
                            .or_insert(0) += 1;
                    }
                    let types: BTreeSet<&str> = issue
                        .get("related_locations")
                        .and_then(|l| l.as_array())
                        .map(|locations| {
                            locations
                                .iter()
                                .filter_map(|loc| loc.get("type").and_then(|t| t.as_str()))
                                .filter(|t| !t.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    for artifact in types {
                        *summary
                            .issues_per_artifact
                            .entry(artifact.to_string())
                            .or_insert(0) += 1;
                    }
                }

                let patch_path = variant_dir.join(format!("{}.patch", variant));
                let Ok(patch_text) = fs::read_to_string(&patch_path) else {
                    continue;
                };
                let patch = PatchEngine::analyze(&patch_text);
                for repo in &patch.repositories {
                    *injection.repositories_affected.entry(repo.clone()).or_insert(0) += 1;
                }
                for (file_type, count) in &patch.file_types {
                    *injection
                        .file_types_affected
                        .entry(file_type.clone())
                        .or_insert(0) += count;
                }
                injection.total_changes.additions += patch.additions;
                injection.total_changes.deletions += patch.deletions;
                injection.total_changes.modifications += patch.modifications;
                injection.total_changes.files_changed += patch.changed_files.len();
                if let Some(pattern) = patch.pattern() {
                    *injection.injection_patterns.entry(pattern).or_insert(0) += 1;
                }
            }
        }
    }

    let variants = summary.total_annotated_variants;
    let avg = |total: usize| {
        if variants > 0 {
            total as f64 / variants as f64
        } else {
            0.0
        }
    };
    let totals = injection.total_changes;
    injection.avg_changes_per_variant = PatchAverages {
        additions: avg(totals.additions),
        deletions: avg(totals.deletions),
        modifications: avg(totals.modifications),
        files_changed: avg(totals.files_changed),
    };

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const PATCH: &str = "\
diff -ruN a/template/src/A.java b/template/src/A.java
--- a/template/src/A.java
+++ b/template/src/A.java
@@ -1,2 +1,2 @@
-    public int size;
+    private int size;
 }
";

    fn write_variant(root: &Path, course: &str, exercise: &str, id: &str, issues: Value) {
        let dir = root.join(course).join(exercise).join(VARIANTS_DIR).join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.json", id)), json!({"issues": issues}).to_string()).unwrap();
        fs::write(dir.join(format!("{}.patch", id)), PATCH).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            summarise_dataset(&temp.path().join("nope"), None).unwrap_err(),
            ReportError::DatasetNotFound(_)
        ));
    }

    #[test]
    fn test_summary_counts() {
        let temp = TempDir::new().unwrap();
        let issue = json!({"category": "VISIBILITY_MISMATCH", "related_locations": [
            {"type": "TEMPLATE_REPOSITORY", "file_path": "A.java", "start_line": 1},
            {"type": "TEMPLATE_REPOSITORY", "file_path": "B.java", "start_line": 3},
            {"type": "PROBLEM_STATEMENT", "file_path": "problem_statement.md", "start_line": 2}
        ]});
        write_variant(temp.path(), "ITP", "H01", "001", json!([issue]));
        write_variant(temp.path(), "ITP", "H01", "002", json!([]));
        write_variant(temp.path(), "ITP", "H02", "001", json!([issue, issue]));
        // unannotated variant is not counted
        fs::create_dir_all(temp.path().join("ITP/H02/variants/002")).unwrap();

        let summary = summarise_dataset(temp.path(), None).unwrap();
        assert_eq!(summary.total_annotated_variants, 3);
        assert_eq!(summary.total_issues, 3);
        assert_eq!(summary.variants_per_exercise["ITP/H01"], 2);
        assert_eq!(summary.variants_per_course["ITP"]["H02"], 1);
        assert_eq!(summary.issues_per_category["VISIBILITY_MISMATCH"], 3);
        assert_eq!(summary.issues_per_artifact["TEMPLATE_REPOSITORY"], 3);

        let injection = &summary.injection_analysis;
        assert_eq!(injection.repositories_affected["template"], 3);
        assert_eq!(injection.injection_patterns["template_only"], 3);
        assert_eq!(injection.total_changes.additions, 3);
        assert_eq!(injection.total_changes.files_changed, 3);
        assert!((injection.avg_changes_per_variant.deletions - 1.0).abs() < 1e-9);

        let only_h02: BTreeSet<String> = ["H02".to_string()].into_iter().collect();
        let filtered = summarise_dataset(temp.path(), Some(&only_h02)).unwrap();
        assert_eq!(filtered.total_annotated_variants, 1);
    }
}
