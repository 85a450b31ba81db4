//! Typed project metadata persisted as `project_metadata.json`.

use bearcave_training::TrainingResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_name: String,
    pub subject_name: String,
    #[serde(default)]
    pub trigger_words: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl ProjectMetadata {
    #[must_use]
    pub fn new(project_name: &str, subject_name: &str, trigger_words: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            subject_name: subject_name.to_string(),
            trigger_words: trigger_words.to_string(),
            description: String::new(),
            created_at: Utc::now(),
            version: METADATA_VERSION.to_string(),
        }
    }

    pub fn save(&self, path: &Path) -> TrainingResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("project_metadata.json");

        let metadata = ProjectMetadata::new("bear", "grizzly", "bcgrizzly");
        metadata.save(&path).unwrap();
        let loaded = ProjectMetadata::load(&path).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.version, METADATA_VERSION);
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(ProjectMetadata::load(Path::new("/missing.json")).is_err());
    }
}
