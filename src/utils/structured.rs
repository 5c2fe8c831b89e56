//! Load and dump structured text files.
//!
//! Run metadata and approach configs are YAML by default, but JSON files are
//! accepted anywhere a YAML file is. The format is picked from the extension.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StructuredError;

/// On-disk representation of a structured file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredFormat {
    Yaml,
    Json,
}

impl StructuredFormat {
    /// `.yaml` / `.yml` map to YAML, everything else to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Reads and deserializes `path`.
pub fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T, StructuredError> {
    if !path.exists() {
        return Err(StructuredError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let parsed = match StructuredFormat::from_path(path) {
        StructuredFormat::Yaml => serde_yaml::from_str(&text).map_err(|e| StructuredError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        StructuredFormat::Json => serde_json::from_str(&text).map_err(|e| StructuredError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }?;
    Ok(parsed)
}

/// Serializes `value` into `path`, creating parent directories.
pub fn dump_structured<T: Serialize>(path: &Path, value: &T) -> Result<(), StructuredError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = match StructuredFormat::from_path(path) {
        StructuredFormat::Yaml => serde_yaml::to_string(value)?,
        StructuredFormat::Json => {
            let mut json = serde_json::to_string_pretty(value)?;
            json.push('\n');
            json
        }
    };
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(StructuredFormat::from_path(Path::new("a.yaml")), StructuredFormat::Yaml);
        assert_eq!(StructuredFormat::from_path(Path::new("a.yml")), StructuredFormat::Yaml);
        assert_eq!(StructuredFormat::from_path(Path::new("a.json")), StructuredFormat::Json);
        assert_eq!(StructuredFormat::from_path(Path::new("noext")), StructuredFormat::Json);
    }

    #[test]
    fn test_yaml_and_json_files() {
        let temp = TempDir::new().unwrap();
        let mut value = BTreeMap::new();
        value.insert("run_id".to_string(), "abc".to_string());

        for name in ["meta.yaml", "meta.json"] {
            let path = temp.path().join("nested").join(name);
            dump_structured(&path, &value).unwrap();
            let loaded: BTreeMap<String, String> = load_structured(&path).unwrap();
            assert_eq!(loaded, value);
        }
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_structured::<serde_json::Value>(&temp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, StructuredError::NotFound(_)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_structured::<serde_json::Value>(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
