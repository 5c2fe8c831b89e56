//! Inconsistency category taxonomy.
//!
//! Variants are tagged with the kind of inconsistency injected into the
//! exercise. Structural categories concern signatures and declarations,
//! semantic ones concern meaning and naming.

use serde::{Deserialize, Serialize};

/// Category of an injected inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InconsistencyCategory {
    MethodReturnTypeMismatch,
    MethodParameterMismatch,
    ConstructorParameterMismatch,
    AttributeTypeMismatch,
    VisibilityMismatch,
    IdentifierNamingInconsistency,
}

/// Broad family of an [`InconsistencyCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Structural,
    Semantic,
}

impl InconsistencyCategory {
    /// Returns all categories, sorted by name.
    pub fn all() -> Vec<InconsistencyCategory> {
        let mut all = vec![
            InconsistencyCategory::MethodReturnTypeMismatch,
            InconsistencyCategory::MethodParameterMismatch,
            InconsistencyCategory::ConstructorParameterMismatch,
            InconsistencyCategory::AttributeTypeMismatch,
            InconsistencyCategory::VisibilityMismatch,
            InconsistencyCategory::IdentifierNamingInconsistency,
        ];
        all.sort_by_key(|c| c.as_str());
        all
    }

    /// The tag used in file names and annotations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MethodReturnTypeMismatch => "METHOD_RETURN_TYPE_MISMATCH",
            Self::MethodParameterMismatch => "METHOD_PARAMETER_MISMATCH",
            Self::ConstructorParameterMismatch => "CONSTRUCTOR_PARAMETER_MISMATCH",
            Self::AttributeTypeMismatch => "ATTRIBUTE_TYPE_MISMATCH",
            Self::VisibilityMismatch => "VISIBILITY_MISMATCH",
            Self::IdentifierNamingInconsistency => "IDENTIFIER_NAMING_INCONSISTENCY",
        }
    }

    pub fn kind(&self) -> CategoryKind {
        match self {
            Self::IdentifierNamingInconsistency => CategoryKind::Semantic,
            _ => CategoryKind::Structural,
        }
    }
}

impl std::fmt::Display for InconsistencyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InconsistencyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown category '{}'", s))
    }
}
