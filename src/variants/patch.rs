//! Unified-diff patches between two exercise artifact trees.
//!
//! Diffs are produced with `diff -ruN` and applied with `patch -p1`. Both
//! trees are staged under `a/` and `b/` in a scratch directory, so patch
//! headers always carry stable `a/<artifact>` / `b/<artifact>` prefixes that
//! name the repository half (solution, template, tests, problem statement).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use crate::error::PatchError;

/// Artifact names that make up an exercise, in processing order.
pub const BASE_ARTIFACTS: [&str; 5] = [
    "problem-statement.md",
    "solution",
    "template",
    "tests",
    "exercise-details.json",
];

/// Computes and applies artifact-tree patches via the system diff tools.
#[derive(Debug, Clone)]
pub struct PatchEngine {
    diff_program: String,
    patch_program: String,
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchEngine {
    pub fn new() -> Self {
        Self {
            diff_program: "diff".to_string(),
            patch_program: "patch".to_string(),
        }
    }

    /// Overrides the `diff` executable.
    pub fn with_diff_program(mut self, program: impl Into<String>) -> Self {
        self.diff_program = program.into();
        self
    }

    /// Overrides the `patch` executable.
    pub fn with_patch_program(mut self, program: impl Into<String>) -> Self {
        self.patch_program = program.into();
        self
    }

    /// Returns true when both `diff` and `patch` can be executed.
    pub fn tools_available() -> bool {
        ["diff", "patch"].iter().all(|program| {
            Command::new(program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    /// Diffs the artifacts of `base_dir` against those of `variant_dir`.
    ///
    /// Only [`BASE_ARTIFACTS`] take part. An artifact present on one side only
    /// shows up as a whole-file add or delete. Returns an empty string when
    /// nothing differs.
    pub fn diff(&self, base_dir: &Path, variant_dir: &Path) -> Result<String, PatchError> {
        let scratch = TempDir::new()?;
        stage_artifacts(base_dir, &scratch.path().join("a"))?;
        stage_artifacts(variant_dir, &scratch.path().join("b"))?;

        let output = Command::new(&self.diff_program)
            .args(["-ruN", "a", "b"])
            .current_dir(scratch.path())
            .output()
            .map_err(|e| self.spawn_error(&self.diff_program, e))?;

        // diff exits 0 when equal, 1 when differences were found
        match output.status.code() {
            Some(0) => Ok(String::new()),
            Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            code => Err(PatchError::DiffFailed {
                code: code.unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// Applies `patch_text` to `target_dir`, which must already hold the base
    /// artifacts. Blank patches are a no-op.
    pub fn apply(&self, target_dir: &Path, patch_text: &str) -> Result<(), PatchError> {
        if patch_text.trim().is_empty() {
            debug!("Empty patch for {}, nothing to apply", target_dir.display());
            return Ok(());
        }

        let mut child = Command::new(&self.patch_program)
            .args(["-p1", "--forward", "--batch"])
            .current_dir(target_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&self.patch_program, e))?;

        // Feed stdin from a separate thread so a chatty patch cannot block on
        // a full stdout pipe while we are still writing.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(patch_text.as_bytes())?;
                }
                Ok(())
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            output.and_then(|output| {
                match written {
                    // patch may exit before draining stdin on a malformed header
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(output),
                }
            })
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let combined = match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("{}\n{}", stderr, stdout),
            (true, false) => stderr,
            _ => stdout,
        };
        Err(PatchError::ApplyFailed { output: combined })
    }

    fn spawn_error(&self, program: &str, err: std::io::Error) -> PatchError {
        if err.kind() == ErrorKind::NotFound {
            PatchError::ToolUnavailable(program.to_string())
        } else {
            PatchError::Io(err)
        }
    }

    /// Summarises which artifacts and how many lines a patch touches.
    pub fn analyze(patch_text: &str) -> PatchSummary {
        let mut summary = PatchSummary::default();
        let mut current_file: Option<String> = None;
        let mut in_hunk = false;

        for line in patch_text.lines() {
            if line.starts_with("diff -ruN") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 4 {
                    let new_path = parts[3].get(2..).unwrap_or_default().to_string();
                    if let Some(repo) = repository_of(&new_path) {
                        summary.repositories.insert(repo.to_string());
                    }
                    *summary
                        .file_types
                        .entry(file_type_of(&new_path).to_string())
                        .or_insert(0) += 1;
                    summary.changed_files.push(new_path.clone());
                    current_file = Some(new_path);
                }
            } else if line.starts_with("@@") {
                if let Some(hunk) = parse_hunk_header(line, current_file.as_deref()) {
                    summary.hunks.push(hunk);
                    in_hunk = true;
                }
            } else if in_hunk && !line.is_empty() {
                if line.starts_with('+') && !line.starts_with("+++") {
                    summary.additions += 1;
                } else if line.starts_with('-') && !line.starts_with("---") {
                    summary.deletions += 1;
                }
            } else if line.trim().is_empty() {
                in_hunk = false;
            }
        }

        summary.modifications = summary.additions.min(summary.deletions);
        summary
    }
}

/// Line-level view of a patch, used by the dataset summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchSummary {
    /// Repository halves touched: `solution`, `template`, `tests`, `problem_statement`.
    pub repositories: BTreeSet<String>,
    pub file_types: BTreeMap<String, usize>,
    pub changed_files: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    /// Lines that were both removed and added, approximated as `min(additions, deletions)`.
    pub modifications: usize,
    pub hunks: Vec<HunkRange>,
}

impl PatchSummary {
    /// Classifies the repository spread: `<repo>_only`, `<a>_<b>` or `multi_repo`.
    pub fn pattern(&self) -> Option<String> {
        match self.repositories.len() {
            0 => None,
            1 => self.repositories.iter().next().map(|repo| format!("{}_only", repo)),
            2 => Some(self.repositories.iter().cloned().collect::<Vec<_>>().join("_")),
            _ => Some("multi_repo".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkRange {
    pub file: Option<String>,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
}

fn hunk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@").expect("static regex"))
}

fn parse_hunk_header(line: &str, file: Option<&str>) -> Option<HunkRange> {
    let caps = hunk_re().captures(line)?;
    let number = |idx: usize, default: u32| -> u32 {
        caps.get(idx)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    };
    Some(HunkRange {
        file: file.map(str::to_string),
        old_start: number(1, 0),
        old_count: number(2, 1),
        new_start: number(3, 0),
        new_count: number(4, 1),
    })
}

fn repository_of(path: &str) -> Option<&'static str> {
    if path.starts_with("solution/") {
        Some("solution")
    } else if path.starts_with("template/") {
        Some("template")
    } else if path.starts_with("tests/") {
        Some("tests")
    } else if path.contains("problem-statement") {
        Some("problem_statement")
    } else {
        None
    }
}

fn file_type_of(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("java") => "java",
        Some("py") => "python",
        Some("md") => "markdown",
        _ => "other",
    }
}

/// Copies the artifacts present in `src_dir` into `dst_dir`.
fn stage_artifacts(src_dir: &Path, dst_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst_dir)?;
    for name in BASE_ARTIFACTS {
        let src = src_dir.join(name);
        if src.exists() {
            copy_artifact(&src, &dst_dir.join(name))?;
        }
    }
    Ok(())
}

/// Copies a file or a directory tree, creating parents as needed.
pub(crate) fn copy_artifact(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)?;
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

/// Removes a file or directory tree; a missing path is not an error.
pub(crate) fn remove_artifact(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn exercise_tree(root: &Path) {
        write(&root.join("problem-statement.md"), "# Task\nImplement add.\n");
        write(
            &root.join("solution/src/Calc.java"),
            "class Calc {\n    int add(int a, int b) { return a + b; }\n}\n",
        );
        write(&root.join("template/src/Calc.java"), "class Calc {\n}\n");
        write(&root.join("exercise-details.json"), "{\"title\": \"Calc\"}\n");
    }

    #[test]
    fn test_diff_and_apply_round_trip() {
        if !PatchEngine::tools_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let variant = temp.path().join("variant");
        exercise_tree(&base);
        exercise_tree(&variant);
        write(
            &variant.join("solution/src/Calc.java"),
            "class Calc {\n    long add(int a, int b) { return a + b; }\n}\n",
        );
        write(&variant.join("tests/CalcTest.java"), "class CalcTest {}\n");

        let engine = PatchEngine::new();
        let patch = engine.diff(&base, &variant).unwrap();
        assert!(patch.contains("a/solution/src/Calc.java"));
        assert!(patch.contains("b/tests/CalcTest.java"));

        let target = temp.path().join("target");
        stage_artifacts(&base, &target).unwrap();
        engine.apply(&target, &patch).unwrap();

        for rel in ["solution/src/Calc.java", "tests/CalcTest.java", "problem-statement.md"] {
            assert_eq!(
                fs::read(target.join(rel)).unwrap(),
                fs::read(variant.join(rel)).unwrap(),
                "{} differs",
                rel
            );
        }
    }

    #[test]
    fn test_identical_trees_give_empty_patch() {
        if !PatchEngine::tools_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let variant = temp.path().join("variant");
        exercise_tree(&base);
        exercise_tree(&variant);
        // Non-artifact files are ignored
        write(&variant.join("notes.txt"), "scratch\n");

        let engine = PatchEngine::new();
        let patch = engine.diff(&base, &variant).unwrap();
        assert!(patch.is_empty());

        let target = temp.path().join("target");
        stage_artifacts(&base, &target).unwrap();
        engine.apply(&target, &patch).unwrap();
        assert_eq!(
            fs::read(target.join("template/src/Calc.java")).unwrap(),
            fs::read(base.join("template/src/Calc.java")).unwrap()
        );
    }

    #[test]
    fn test_apply_conflict_reports_output() {
        if !PatchEngine::tools_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        write(&target.join("problem-statement.md"), "something else entirely\n");

        let patch = "\
diff -ruN a/problem-statement.md b/problem-statement.md
--- a/problem-statement.md
+++ b/problem-statement.md
@@ -1,2 +1,2 @@
 # Task
-Implement add.
+Implement sub.
";
        let err = PatchEngine::new().apply(&target, patch).unwrap_err();
        match err {
            PatchError::ApplyFailed { output } => assert!(!output.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let temp = TempDir::new().unwrap();
        let engine = PatchEngine::new().with_patch_program("pecv-no-such-patch-tool");
        let err = engine.apply(temp.path(), "diff -ruN a/x b/x\n").unwrap_err();
        assert!(matches!(err, PatchError::ToolUnavailable(_)));
    }

    #[test]
    fn test_analyze_counts_lines_and_repositories() {
        let patch = "\
diff -ruN a/solution/src/Calc.java b/solution/src/Calc.java
--- a/solution/src/Calc.java
+++ b/solution/src/Calc.java
@@ -1,3 +1,3 @@
 class Calc {
-    int add(int a, int b) { return a + b; }
+    long add(int a, int b) { return a + b; }
 }
diff -ruN a/problem-statement.md b/problem-statement.md
--- a/problem-statement.md
+++ b/problem-statement.md
@@ -2 +2,2 @@
+Return a long.
";
        let summary = PatchEngine::analyze(patch);
        assert_eq!(summary.additions, 2);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.modifications, 1);
        assert_eq!(
            summary.changed_files,
            vec!["solution/src/Calc.java", "problem-statement.md"]
        );
        assert_eq!(summary.file_types.get("java"), Some(&1));
        assert_eq!(summary.file_types.get("markdown"), Some(&1));
        assert_eq!(summary.hunks.len(), 2);
        assert_eq!(summary.hunks[1].old_count, 1);
        assert_eq!(summary.hunks[1].new_count, 2);
        assert_eq!(summary.pattern().as_deref(), Some("problem_statement_solution"));
    }

    #[test]
    fn test_analyze_empty_patch() {
        let summary = PatchEngine::analyze("");
        assert_eq!(summary, PatchSummary::default());
        assert!(summary.pattern().is_none());
    }

    #[test]
    fn test_remove_artifact_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        remove_artifact(&temp.path().join("nothing")).unwrap();
        let dir = temp.path().join("dir/nested");
        fs::create_dir_all(&dir).unwrap();
        remove_artifact(&temp.path().join("dir")).unwrap();
        assert!(!temp.path().join("dir").exists());
    }
}
