//! Project definition node: creates the project folder skeleton and persists
//! the initial metadata and training configuration.

use crate::metadata::ProjectMetadata;
use bearcave_training::{PerformanceMode, ProjectLayout, TrainingConfig, TrainingResult};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DefineOutputs {
    pub project_path: String,
    pub source_path: String,
    pub conform_path: String,
    pub output_path: String,
    /// `project_metadata.json` contents.
    pub project_metadata: String,
    /// `training_config.json` contents.
    pub training_config: String,
    pub success: bool,
    pub status_message: String,
}

#[derive(Debug, Default)]
pub struct DefineNode;

/// Makes a name safe for use as a folder name: whitespace collapses to `_`,
/// anything outside `[A-Za-z0-9_-]` is dropped.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() { "untitled".to_string() } else { cleaned }
}

fn sample_prompts_for(trigger_words: &str) -> Option<String> {
    if trigger_words.trim().is_empty() {
        return None;
    }
    Some(
        [
            format!("{trigger_words}, portrait, high quality"),
            format!("{trigger_words}, smiling, professional photo"),
            format!("{trigger_words}, looking at camera, studio lighting"),
        ]
        .join("\n"),
    )
}

impl DefineNode {
    /// Creates `<base>/<project>/{01_source,02_conform,03_output}` plus logs
    /// and samples folders, and writes the two project JSON documents.
    #[must_use]
    pub fn define_project(
        &self,
        project_name: &str,
        subject_name: &str,
        base_path: &str,
        trigger_words: &str,
        performance_mode: PerformanceMode,
    ) -> DefineOutputs {
        match self.try_define(project_name, subject_name, base_path, trigger_words, performance_mode)
        {
            Ok(outputs) => outputs,
            Err(e) => DefineOutputs {
                project_path: String::new(),
                source_path: String::new(),
                conform_path: String::new(),
                output_path: String::new(),
                project_metadata: String::new(),
                training_config: String::new(),
                success: false,
                status_message: format!("failed to define project: {e}"),
            },
        }
    }

    fn try_define(
        &self,
        project_name: &str,
        subject_name: &str,
        base_path: &str,
        trigger_words: &str,
        performance_mode: PerformanceMode,
    ) -> TrainingResult<DefineOutputs> {
        let project = sanitize_name(project_name);
        let subject = sanitize_name(subject_name);

        let layout = ProjectLayout::new(Path::new(base_path), &project);
        layout.ensure_dirs()?;
        self.write_readmes(&layout)?;

        let metadata = ProjectMetadata::new(&project, &subject, trigger_words);
        metadata.save(&layout.metadata_path())?;

        let mut config = TrainingConfig::default();
        config.apply_performance_mode(performance_mode);
        config.train_data_dir = layout.conform_dir();
        config.output_dir = layout.output_dir();
        config.logging_dir = layout.logs_dir();
        config.output_name = format!("{project}_{subject}");
        config.sample_prompts = sample_prompts_for(trigger_words);
        let config_json = serde_json::to_string_pretty(&config)?;
        std::fs::write(layout.config_path(), &config_json)?;

        info!(project = %project, root = %layout.root().display(), "project defined");

        Ok(DefineOutputs {
            project_path: layout.root().display().to_string(),
            source_path: layout.source_dir().display().to_string(),
            conform_path: layout.conform_dir().display().to_string(),
            output_path: layout.output_dir().display().to_string(),
            project_metadata: serde_json::to_string_pretty(&metadata)?,
            training_config: config_json,
            success: true,
            status_message: format!("project '{project}' created"),
        })
    }

    fn write_readmes(&self, layout: &ProjectLayout) -> TrainingResult<()> {
        let entries = [
            (layout.source_dir(), "# 01_source\n\nRaw input images, exactly as collected.\n"),
            (
                layout.conform_dir(),
                "# 02_conform\n\nCropped and conformed images ready for training, \
                 with caption sidecars.\n",
            ),
            (
                layout.output_dir(),
                "# 03_output\n\nTrained models, logs, samples, and training_results.json.\n",
            ),
        ];
        for (dir, text) in entries {
            std::fs::write(dir.join("README.md"), text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Bear Cave 01"), "Bear_Cave_01");
        assert_eq!(sanitize_name("  griz/zly!  "), "grizzly");
        assert_eq!(sanitize_name("///"), "untitled");
    }

    #[test]
    fn test_define_project_creates_skeleton_and_documents() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().display().to_string();

        let outputs = DefineNode.define_project(
            "bear cave",
            "grizzly",
            &base,
            "bcgrizzly",
            PerformanceMode::Quality,
        );
        assert!(outputs.success, "{}", outputs.status_message);

        let root = temp.path().join("bear_cave");
        assert!(root.join("01_source/README.md").is_file());
        assert!(root.join("02_conform").is_dir());
        assert!(root.join("03_output/logs").is_dir());
        assert!(root.join("03_output/samples").is_dir());
        assert!(root.join("project_metadata.json").is_file());

        let config: TrainingConfig =
            serde_json::from_str(&std::fs::read_to_string(root.join("training_config.json")).unwrap())
                .unwrap();
        assert_eq!(config.max_train_epochs, 25); // quality preset
        assert_eq!(config.output_name, "bear_cave_grizzly");
        assert!(config.sample_prompts.unwrap().contains("bcgrizzly, portrait"));
    }

    #[test]
    fn test_define_project_failure_is_folded() {
        let outputs = DefineNode.define_project(
            "bear",
            "grizzly",
            "/proc/definitely-not-writable/x",
            "",
            PerformanceMode::Balanced,
        );
        assert!(!outputs.success);
        assert!(outputs.status_message.contains("failed to define project"));
    }
}
