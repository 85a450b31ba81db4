//! Filesystem layout for a LoRA project.
//!
//! Layout is `<base>/<project>/{01_source,02_conform,03_output}` with logs and
//! samples under the output folder, plus fixed metadata filenames at the root.

use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    #[must_use]
    pub fn new(base: &Path, project_name: &str) -> Self {
        Self { root: base.join(project_name) }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw, unprocessed input images.
    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("01_source")
    }

    /// Cropped/conformed images ready for training.
    #[must_use]
    pub fn conform_dir(&self) -> PathBuf {
        self.root.join("02_conform")
    }

    /// Trained models and training by-products.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("03_output")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir().join("logs")
    }

    #[must_use]
    pub fn samples_dir(&self) -> PathBuf {
        self.output_dir().join("samples")
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("project_metadata.json")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("training_config.json")
    }

    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.output_dir().join("training_results.json")
    }

    /// Creates the full folder skeleton. Idempotent.
    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.source_dir())?;
        std::fs::create_dir_all(self.conform_dir())?;
        std::fs::create_dir_all(self.output_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.samples_dir())?;
        Ok(())
    }
}
