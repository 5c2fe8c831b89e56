//! Reading persisted case outputs and gold annotations.
//!
//! Checker payloads drift between versions, so extraction is tolerant:
//! issues may sit under `response.issues` or at the top level, timing and
//! cost keys come in snake and camel case, and numbers may be strings.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ReportError;
use crate::scoring::{parse_issues, Issue};
use crate::variants::VARIANTS_DIR;

/// `(course, exercise, variant)` of a case file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseParts {
    pub course: String,
    pub exercise: String,
    pub variant: String,
}

impl CaseParts {
    pub fn case_id(&self) -> String {
        format!("{}/{}/{}", self.course, self.exercise, self.variant)
    }
}

/// One parsed case output file.
#[derive(Debug, Clone)]
pub struct CaseRecord {
    /// Path relative to the run's `cases/` directory.
    pub relative: String,
    pub parts: Option<CaseParts>,
    /// `course/exercise`, from the embedded case id or the path.
    pub exercise_key: Option<String>,
    /// `None` when the payload carries no issue list at all.
    pub predictions: Option<Vec<Issue>>,
    pub duration_s: Option<f64>,
    pub cost_usd: Option<f64>,
}

/// Reads and interprets one case file under `cases_dir`.
pub fn load_case(cases_dir: &Path, case_path: &Path) -> Result<CaseRecord, ReportError> {
    let data: Value = serde_json::from_str(&fs::read_to_string(case_path)?)?;
    let relative = case_path
        .strip_prefix(cases_dir)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| {
            case_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

    Ok(CaseRecord {
        relative,
        parts: resolve_case_parts(cases_dir, case_path),
        exercise_key: derive_exercise_key(&data, cases_dir, case_path),
        predictions: extract_predictions(&data),
        duration_s: extract_duration(&data),
        cost_usd: extract_cost(&data),
    })
}

/// Predicted issues from `response.issues`, falling back to `issues`.
pub fn extract_predictions(data: &Value) -> Option<Vec<Issue>> {
    if let Some(issues) = data
        .get("response")
        .filter(|r| r.is_object())
        .and_then(|r| r.get("issues"))
        .filter(|i| i.is_array())
    {
        return Some(parse_issues(issues));
    }
    data.get("issues")
        .filter(|i| i.is_array())
        .map(parse_issues)
}

pub fn extract_duration(data: &Value) -> Option<f64> {
    let timing = data.get("timing")?;
    first_number(timing, &["duration_s", "durationS"])
}

pub fn extract_cost(data: &Value) -> Option<f64> {
    let cost = data
        .get("cost")
        .filter(|c| c.is_object())
        .or_else(|| data.get("costs").filter(|c| c.is_object()))?;
    first_number(cost, &["total_usd", "totalUsd"])
}

fn first_number(object: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|v| !v.is_null())
        .and_then(safe_number)
}

/// Numbers and numeric strings; booleans and everything else are `None`.
pub fn safe_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `<course>/<exercise>/<variant>.json` relative to `cases_dir`.
pub fn resolve_case_parts(cases_dir: &Path, case_path: &Path) -> Option<CaseParts> {
    let relative = case_path.strip_prefix(cases_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    let variant = case_path.file_stem()?.to_string_lossy().into_owned();
    Some(CaseParts {
        course: parts[0].clone(),
        exercise: parts[1].clone(),
        variant,
    })
}

/// `course/exercise` from the payload's `case_id`, else from the path.
pub fn derive_exercise_key(data: &Value, cases_dir: &Path, case_path: &Path) -> Option<String> {
    if let Some(case_id) = data.get("case_id").and_then(|v| v.as_str()) {
        let parts: Vec<&str> = case_id.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            return Some(format!("{}/{}", parts[0], parts[1]));
        }
    }
    let relative = case_path.strip_prefix(cases_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (parts.len() >= 2).then(|| format!("{}/{}", parts[0], parts[1]))
}

/// `<data>/<course>/<exercise>/variants/<variant>/<variant>.json`
pub fn gold_path(data_root: &Path, parts: &CaseParts) -> PathBuf {
    data_root
        .join(&parts.course)
        .join(&parts.exercise)
        .join(VARIANTS_DIR)
        .join(&parts.variant)
        .join(format!("{}.json", parts.variant))
}

/// Loads the gold issues of a case. A missing or unreadable annotation is
/// [`ReportError::AnnotationMissing`].
pub fn load_gold_issues(data_root: &Path, parts: &CaseParts) -> Result<Vec<Issue>, ReportError> {
    let path = gold_path(data_root, parts);
    let missing = || ReportError::AnnotationMissing { path: path.clone() };
    let text = fs::read_to_string(&path).map_err(|_| missing())?;
    let data: Value = serde_json::from_str(&text).map_err(|_| missing())?;
    Ok(data.get("issues").map(parse_issues).unwrap_or_default())
}
