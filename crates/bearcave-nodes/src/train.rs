//! LoRA training node: drives the job registry from the host's polling loop.
//!
//! The host re-executes the node on a timer with the same inputs, so every
//! call must be synchronous and side-effect-free apart from the registry
//! operations themselves: start when requested, otherwise report the latest
//! status, stop when requested.

use bearcave_training::{
    ExtraValue, JobId, JobStatus, TrainingConfig, TrainingProgress, TrainingRegistry,
    TrainingStatus, TrainingSupervisor,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Wire inputs of the train node.
#[derive(Debug, Clone)]
pub struct TrainInputs {
    /// Training configuration JSON (`training_config.json` contents); empty
    /// or `{}` selects the defaults.
    pub training_config: String,
    /// Directory of conformed training images.
    pub conform_path: String,
    /// Job output directory; also the source of the job identity.
    pub output_path: String,
    pub start_training: bool,
    pub stop_training: bool,
    pub resume_from_checkpoint: String,
    pub save_samples: bool,
    pub sample_frequency: u32,
    /// `key=value` per line; `#` starts a comment. Values are type-inferred.
    pub custom_args: String,
    pub dry_run: bool,
    /// When off, per-line progress is not logged; polling still works.
    pub enable_progress_monitoring: bool,
}

impl Default for TrainInputs {
    fn default() -> Self {
        Self {
            training_config: String::new(),
            conform_path: String::new(),
            output_path: String::new(),
            start_training: false,
            stop_training: false,
            resume_from_checkpoint: String::new(),
            save_samples: true,
            sample_frequency: 5,
            custom_args: String::new(),
            dry_run: false,
            enable_progress_monitoring: true,
        }
    }
}

/// Wire outputs of the train node.
#[derive(Debug, Clone)]
pub struct TrainOutputs {
    pub training_status: String,
    pub progress_percentage: String,
    pub epoch_info: String,
    /// Current metrics as JSON.
    pub training_metrics: String,
    pub model_path: String,
    pub training_log: String,
    pub training_active: bool,
    pub status_message: String,
    /// Final results as JSON; `{}` until the job finishes.
    pub training_results: String,
}

impl TrainOutputs {
    fn idle(message: &str) -> Self {
        Self {
            training_status: "idle".to_string(),
            progress_percentage: "0.0".to_string(),
            epoch_info: "No training active".to_string(),
            training_metrics: "{}".to_string(),
            model_path: String::new(),
            training_log: String::new(),
            training_active: false,
            status_message: message.to_string(),
            training_results: "{}".to_string(),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            training_status: "error".to_string(),
            training_log: message.to_string(),
            status_message: message.to_string(),
            ..Self::idle(message)
        }
    }
}

/// Parses the multiline `custom_args` input into trainer CLI overrides.
#[must_use]
pub fn parse_custom_args(raw: &str) -> BTreeMap<String, ExtraValue> {
    let mut overrides = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            overrides.insert(key.trim().to_string(), ExtraValue::parse(value));
        }
    }
    overrides
}

pub struct TrainNode {
    registry: Arc<TrainingRegistry>,
}

impl TrainNode {
    #[must_use]
    pub fn new(registry: Arc<TrainingRegistry>) -> Self {
        Self { registry }
    }

    /// One host-scheduled execution: start, poll, or stop depending on inputs.
    #[must_use]
    pub fn execute(&self, inputs: TrainInputs) -> TrainOutputs {
        let id = JobId::for_output_path(&inputs.output_path);

        if inputs.stop_training {
            return Self::map_status(self.registry.stop(&id));
        }

        // An already-registered job is reported as-is; inputs other than the
        // identity are ignored until it finishes.
        match self.registry.poll(&id) {
            JobStatus::Inactive { .. } => {}
            status => return Self::map_status(status),
        }

        if !inputs.start_training {
            return TrainOutputs::idle("Training ready - set 'start_training' to begin");
        }

        let config = match Self::build_config(&inputs) {
            Ok(config) => config,
            Err(message) => return TrainOutputs::error(&message),
        };

        if inputs.dry_run {
            return self.dry_run(&config);
        }

        let callback = inputs.enable_progress_monitoring.then(|| {
            let callback: bearcave_training::ProgressCallback =
                Box::new(|snapshot: &TrainingProgress| {
                    info!(
                        epoch = snapshot.current_epoch,
                        total_epochs = snapshot.total_epochs,
                        loss = ?snapshot.loss,
                        percent = format!("{:.1}", snapshot.percent_complete()),
                        "training progress"
                    );
                });
            callback
        });
        Self::map_status(self.registry.start_or_get(&id, config, callback))
    }

    fn build_config(inputs: &TrainInputs) -> Result<TrainingConfig, String> {
        let trimmed = inputs.training_config.trim();
        let mut config: TrainingConfig = if trimmed.is_empty() || trimmed == "{}" {
            TrainingConfig::default()
        } else {
            serde_json::from_str(trimmed).map_err(|e| format!("Invalid JSON input: {e}"))?
        };

        config.train_data_dir = PathBuf::from(&inputs.conform_path);
        config.output_dir = PathBuf::from(&inputs.output_path);
        config.logging_dir = config.output_dir.join("logs");

        let resume = Path::new(&inputs.resume_from_checkpoint);
        if !inputs.resume_from_checkpoint.is_empty() && resume.exists() {
            config.resume_from = Some(resume.to_path_buf());
        }

        if inputs.save_samples {
            config.sample_every_n_epochs = Some(inputs.sample_frequency);
            std::fs::create_dir_all(config.output_dir.join("samples"))
                .map_err(|e| format!("failed to create samples directory: {e}"))?;
        }

        config.extra.extend(parse_custom_args(&inputs.custom_args));
        Ok(config)
    }

    /// Validates the environment and stops before launching anything.
    fn dry_run(&self, config: &TrainingConfig) -> TrainOutputs {
        let supervisor = TrainingSupervisor::new(self.registry.command().clone());
        match config.validate().and_then(|()| supervisor.prepare(config)) {
            Ok(images) => TrainOutputs {
                training_status: "dry_run".to_string(),
                status_message: format!(
                    "dry run successful: {images} training images, configuration valid"
                ),
                ..TrainOutputs::idle("")
            },
            Err(e) => TrainOutputs::error(&format!("dry run failed: {e}")),
        }
    }

    fn map_status(status: JobStatus) -> TrainOutputs {
        match status {
            JobStatus::Inactive { message } => TrainOutputs::idle(&message),
            JobStatus::Rejected { error } => TrainOutputs::error(&error),
            JobStatus::Active(snapshot) => {
                let epoch_info =
                    format!("Epoch {}/{}", snapshot.current_epoch, snapshot.total_epochs);
                let metrics = serde_json::json!({
                    "status": snapshot.status,
                    "current_epoch": snapshot.current_epoch,
                    "total_epochs": snapshot.total_epochs,
                    "current_step": snapshot.current_step,
                    "total_steps": snapshot.total_steps,
                    "loss": snapshot.loss,
                    "learning_rate": snapshot.learning_rate,
                    "eta": snapshot.eta,
                    "progress_percentage": snapshot.percent_complete(),
                });
                TrainOutputs {
                    training_status: snapshot.status.as_str().to_string(),
                    progress_percentage: format!("{:.1}", snapshot.percent_complete()),
                    epoch_info: epoch_info.clone(),
                    training_metrics: metrics.to_string(),
                    model_path: String::new(),
                    training_log: snapshot.log,
                    training_active: true,
                    status_message: format!("Training in progress - {epoch_info}"),
                    training_results: "{}".to_string(),
                }
            }
            JobStatus::Finished(result) => {
                let (progress, epoch_info, message) = match result.status {
                    TrainingStatus::Completed => (
                        "100.0".to_string(),
                        format!("Training completed - {} epochs", result.total_epochs),
                        "Training completed successfully".to_string(),
                    ),
                    TrainingStatus::Stopped => (
                        "0.0".to_string(),
                        "Training stopped".to_string(),
                        "Training stopped by user".to_string(),
                    ),
                    _ => (
                        "0.0".to_string(),
                        "Error".to_string(),
                        format!("Training failed: {}", result.error_message),
                    ),
                };
                let results_json =
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".to_string());
                TrainOutputs {
                    training_status: result.status.as_str().to_string(),
                    progress_percentage: progress,
                    epoch_info,
                    training_metrics: results_json.clone(),
                    model_path: result
                        .model_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    training_log: result.log.clone(),
                    training_active: false,
                    status_message: message,
                    training_results: results_json,
                }
            }
        }
    }
}
