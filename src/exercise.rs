//! Exercise identifiers and dataset enumeration.

use std::fmt;
use std::fs;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// A `(course, exercise)` pair naming one exercise directory under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExerciseId {
    pub course: String,
    pub exercise: String,
}

impl ExerciseId {
    pub fn new(course: impl Into<String>, exercise: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            exercise: exercise.into(),
        }
    }

    /// Parses `course/exercise`; extra trailing components are ignored.
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<String> = Path::new(value)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        if parts.len() < 2 {
            return Err(format!(
                "Exercise path must include course and exercise, e.g. ITP2425/H01E01-Lectures (got '{}')",
                value
            ));
        }
        Ok(Self::new(parts[0].clone(), parts[1].clone()))
    }

    /// `course/exercise`.
    pub fn relative(&self) -> String {
        format!("{}/{}", self.course, self.exercise)
    }

    /// Case identifier of one variant of this exercise.
    pub fn case_id(&self, variant_id: &str) -> String {
        format!("{}/{}/{}", self.course, self.exercise, variant_id)
    }
}

impl fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.course, self.exercise)
    }
}

impl std::str::FromStr for ExerciseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn sorted_subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    Ok(names)
}

/// Lists every `course/exercise` directory under `data_root`, sorted.
pub fn iter_exercises(data_root: &Path) -> std::io::Result<Vec<ExerciseId>> {
    let mut exercises = Vec::new();
    for course in sorted_subdirs(data_root)? {
        for exercise in sorted_subdirs(&data_root.join(&course))? {
            exercises.push(ExerciseId::new(course.clone(), exercise));
        }
    }
    Ok(exercises)
}
