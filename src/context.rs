//! Filesystem layout of a benchmark checkout.
//!
//! Every component receives a [`BenchContext`] instead of reading global
//! path constants, so tests can point the whole system at a temp directory.

use std::path::{Path, PathBuf};

/// Name of the directory holding the reference checker sources.
pub const REFERENCE_DIR: &str = "pecv-reference";

/// Resolved roots of the benchmark repository.
#[derive(Debug, Clone)]
pub struct BenchContext {
    /// Repository root; relative paths in run metadata are resolved against it.
    pub project_root: PathBuf,
    /// Dataset root: `<course>/<exercise>/{artifacts, variants/}`.
    pub data_root: PathBuf,
    /// Case outputs: `<approach>/<run>/cases/...`.
    pub results_root: PathBuf,
    /// Run metadata: `<approach>/<run>.yaml`.
    pub runs_root: PathBuf,
    /// Approach configurations.
    pub configs_root: PathBuf,
    /// Prepended to `PYTHONPATH` for checker processes.
    pub reference_root: PathBuf,
}

impl BenchContext {
    /// Creates a context with the standard layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let project_root = root.into();
        Self {
            data_root: project_root.join("data"),
            results_root: project_root.join("results"),
            runs_root: project_root.join("runs"),
            configs_root: project_root.join("configs"),
            reference_root: project_root.join(REFERENCE_DIR),
            project_root,
        }
    }

    /// Overrides the dataset root.
    pub fn with_data_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_root = dir.into();
        self
    }

    /// Overrides the results root.
    pub fn with_results_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_root = dir.into();
        self
    }

    /// Overrides the run metadata root.
    pub fn with_runs_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runs_root = dir.into();
        self
    }

    /// Default approach configuration file.
    pub fn default_config_path(&self) -> PathBuf {
        self.configs_root.join("pecv-reference.yaml")
    }

    /// Resolves `candidate` against the project root unless it is absolute.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.project_root.join(candidate)
        }
    }

    /// Expresses `path` relative to the project root when possible.
    pub fn relativize(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

impl Default for BenchContext {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout() {
        let ctx = BenchContext::new("/bench");
        assert_eq!(ctx.data_root, PathBuf::from("/bench/data"));
        assert_eq!(ctx.results_root, PathBuf::from("/bench/results"));
        assert_eq!(ctx.runs_root, PathBuf::from("/bench/runs"));
        assert_eq!(ctx.reference_root, PathBuf::from("/bench/pecv-reference"));
        assert_eq!(
            ctx.default_config_path(),
            PathBuf::from("/bench/configs/pecv-reference.yaml")
        );
    }

    #[test]
    fn test_resolve_and_relativize() {
        let ctx = BenchContext::new("/bench");
        assert_eq!(ctx.resolve("configs/a.yaml"), PathBuf::from("/bench/configs/a.yaml"));
        assert_eq!(ctx.resolve("/abs/a.yaml"), PathBuf::from("/abs/a.yaml"));
        assert_eq!(ctx.relativize(Path::new("/bench/configs/a.yaml")), "configs/a.yaml");
        assert_eq!(ctx.relativize(Path::new("/elsewhere/a.yaml")), "/elsewhere/a.yaml");
    }
}
