//! Issue model and location tokens.
//!
//! Gold and predicted issues share one representation. Payloads are parsed
//! leniently since checker output drifts: malformed locations are skipped and
//! issues without a category are dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Artifact type used when a location omits one.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";
/// File path used for locations without a path.
pub const DEFAULT_FILE: &str = "problem_statement.md";

const REPOSITORY_PREFIXES: [&str; 4] = [
    "solution_repository/",
    "template_repository/",
    "solution/",
    "template/",
];

/// One comparable unit: a single line of a single file of one artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationToken {
    pub artifact_type: String,
    pub file_path: String,
    pub line: i64,
}

impl LocationToken {
    pub fn new(artifact_type: impl Into<String>, file_path: impl Into<String>, line: i64) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            file_path: file_path.into(),
            line,
        }
    }

    /// Token standing in for issues that carry no location.
    pub fn sentinel() -> Self {
        Self::new("PROBLEM_STATEMENT", DEFAULT_FILE, 0)
    }
}

pub type TokenSet = HashSet<LocationToken>;

/// A line range inside one artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub start_line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
}

impl Location {
    pub fn new(artifact_type: &str, file_path: &str, start_line: i64, end_line: i64) -> Self {
        Self {
            artifact_type: Some(artifact_type.to_string()),
            file_path: Some(file_path.to_string()),
            start_line,
            end_line: Some(end_line),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| {
            object
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let start_line = object.get("start_line").and_then(as_line).unwrap_or(0);
        Some(Self {
            artifact_type: text("type"),
            file_path: text("file_path"),
            start_line,
            end_line: object.get("end_line").and_then(as_line),
        })
    }
}

/// An inconsistency: a category plus the locations it spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    #[serde(rename = "related_locations", default)]
    pub locations: Vec<Location>,
}

impl Issue {
    pub fn new(category: impl Into<String>, locations: Vec<Location>) -> Self {
        Self {
            category: category.into(),
            locations,
        }
    }

    pub fn tokens(&self) -> TokenSet {
        tokenize(self)
    }
}

/// Strips repository prefixes; an empty path maps to the problem statement.
pub fn unify_path(path: &str) -> String {
    if path.is_empty() {
        return DEFAULT_FILE.to_string();
    }
    for prefix in REPOSITORY_PREFIXES {
        if let Some(rest) = path.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    path.to_string()
}

/// Expands an issue into one token per covered line. Never empty.
pub fn tokenize(issue: &Issue) -> TokenSet {
    let mut tokens = TokenSet::new();
    for location in &issue.locations {
        let artifact_type = location.artifact_type.as_deref().unwrap_or(UNKNOWN_TYPE);
        let mut file_path = unify_path(location.file_path.as_deref().unwrap_or_default());
        if file_path.is_empty() {
            file_path = DEFAULT_FILE.to_string();
        }
        let start = location.start_line;
        let end = location.end_line.unwrap_or(start).max(start);
        for line in start..=end {
            tokens.insert(LocationToken::new(artifact_type, file_path.clone(), line));
        }
    }
    if tokens.is_empty() {
        tokens.insert(LocationToken::sentinel());
    }
    tokens
}

/// Parses an `issues` array. Anything that is not an array yields no issues.
pub fn parse_issues(payload: &Value) -> Vec<Issue> {
    payload
        .as_array()
        .map(|entries| entries.iter().filter_map(parse_issue).collect())
        .unwrap_or_default()
}

/// Parses one issue object; `None` when it is not an object or has no category.
pub fn parse_issue(value: &Value) -> Option<Issue> {
    let object = value.as_object()?;
    let category = object
        .get("category")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())?;
    let locations = object
        .get("related_locations")
        .and_then(|v| v.as_array())
        .map(|entries| entries.iter().filter_map(Location::from_value).collect())
        .unwrap_or_default();
    Some(Issue::new(category, locations))
}

/// Accepts integer, float and numeric string line numbers.
fn as_line(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
