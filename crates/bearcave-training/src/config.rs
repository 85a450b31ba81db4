//! Strongly typed training configuration and trainer CLI translation.
//!
//! Defaults are the Apple-Silicon-tuned values the node pack ships with.
//! [`TrainingConfig::to_trainer_args`] owns the fixed key-to-flag mapping for
//! the external trainer's CLI; that mapping is compatibility data and must not
//! be reinterpreted.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    Fp16,
    Bf16,
    No,
}

impl PrecisionMode {
    #[must_use]
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Fp16 => "fp16",
            Self::Bf16 => "bf16",
            Self::No => "no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFormat {
    Safetensors,
    Ckpt,
    Pt,
}

impl SaveFormat {
    #[must_use]
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Safetensors => "safetensors",
            Self::Ckpt => "ckpt",
            Self::Pt => "pt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    AdamW,
    AdamW8bit,
    Lion,
    Prodigy,
}

impl OptimizerKind {
    /// Spelling expected by the external trainer.
    #[must_use]
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::AdamW => "AdamW",
            Self::AdamW8bit => "AdamW8bit",
            Self::Lion => "Lion",
            Self::Prodigy => "Prodigy",
        }
    }
}

/// Preset trade-offs between wall-clock time and output quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    Fast,
    Balanced,
    Quality,
}

/// One user-supplied override value passed through to the trainer CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ExtraValue {
    /// Parses a raw string with bool/int/float inference, falling back to text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return Self::Float(value);
        }
        Self::Text(trimmed.to_string())
    }

    #[must_use]
    pub fn to_arg(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

/// Immutable configuration for one training job.
///
/// Constructed from the project defaults merged with user overrides, validated
/// once at start time, and never mutated after launch. Resuming is a new
/// config, not an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub train_data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub logging_dir: PathBuf,
    pub output_name: String,

    pub resolution: u32,
    pub train_batch_size: u32,
    pub max_train_epochs: u32,
    pub save_every_n_epochs: u32,

    pub network_dim: u32,
    pub network_alpha: u32,
    pub network_module: String,

    pub learning_rate: f64,
    pub lr_scheduler: String,
    pub lr_warmup_steps: u32,
    pub optimizer: OptimizerKind,

    pub mixed_precision: PrecisionMode,
    pub save_precision: PrecisionMode,
    pub save_format: SaveFormat,

    pub gradient_checkpointing: bool,
    pub gradient_accumulation_steps: u32,
    pub enable_bucket: bool,
    pub bucket_no_upscale: bool,
    pub save_state: bool,
    pub scale_v_pred_loss_like_noise_pred: bool,

    pub noise_offset: f64,
    pub min_snr_gamma: f64,
    pub max_grad_norm: f64,

    #[serde(default)]
    pub resume_from: Option<PathBuf>,
    #[serde(default)]
    pub sample_every_n_epochs: Option<u32>,
    #[serde(default)]
    pub sample_prompts: Option<String>,

    /// Arbitrary key/value overrides appended to the trainer CLI.
    #[serde(default)]
    pub extra: BTreeMap<String, ExtraValue>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_data_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            logging_dir: PathBuf::new(),
            output_name: String::new(),
            resolution: 1024,
            train_batch_size: 2,
            max_train_epochs: 15,
            save_every_n_epochs: 5,
            network_dim: 32,
            network_alpha: 16,
            network_module: "networks.lora".to_string(),
            learning_rate: 1e-4,
            lr_scheduler: "cosine_with_restarts".to_string(),
            lr_warmup_steps: 100,
            optimizer: OptimizerKind::AdamW8bit,
            mixed_precision: PrecisionMode::Fp16,
            save_precision: PrecisionMode::Fp16,
            save_format: SaveFormat::Safetensors,
            gradient_checkpointing: true,
            gradient_accumulation_steps: 1,
            enable_bucket: true,
            bucket_no_upscale: true,
            save_state: true,
            scale_v_pred_loss_like_noise_pred: true,
            noise_offset: 0.1,
            min_snr_gamma: 5.0,
            max_grad_norm: 1.0,
            resume_from: None,
            sample_every_n_epochs: None,
            sample_prompts: None,
            extra: BTreeMap::new(),
        }
    }
}

impl TrainingConfig {
    /// Applies one of the preset performance trade-offs.
    pub fn apply_performance_mode(&mut self, mode: PerformanceMode) {
        match mode {
            PerformanceMode::Fast => {
                self.train_batch_size = 4;
                self.max_train_epochs = 10;
                self.network_dim = 16;
                self.network_alpha = 8;
                self.learning_rate = 2e-4;
                self.gradient_accumulation_steps = 1;
            }
            PerformanceMode::Balanced => {
                self.train_batch_size = 2;
                self.max_train_epochs = 15;
                self.network_dim = 32;
                self.network_alpha = 16;
                self.learning_rate = 1e-4;
                self.gradient_accumulation_steps = 1;
            }
            PerformanceMode::Quality => {
                self.train_batch_size = 1;
                self.max_train_epochs = 25;
                self.network_dim = 64;
                self.network_alpha = 32;
                self.learning_rate = 5e-5;
                self.gradient_accumulation_steps = 2;
            }
        }
    }

    /// Shape validation: paths present, numerics positive.
    ///
    /// Filesystem checks (input directory exists, contains images) belong to
    /// [`TrainingSupervisor::prepare`](crate::supervisor::TrainingSupervisor::prepare).
    pub fn validate(&self) -> TrainingResult<()> {
        if self.train_data_dir.as_os_str().is_empty() {
            return Err(TrainingError::Validation("train_data_dir is required".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(TrainingError::Validation("output_dir is required".to_string()));
        }
        if self.logging_dir.as_os_str().is_empty() {
            return Err(TrainingError::Validation("logging_dir is required".to_string()));
        }
        if self.resolution == 0 {
            return Err(TrainingError::Validation("resolution must be >= 1".to_string()));
        }
        if self.train_batch_size == 0 {
            return Err(TrainingError::Validation("train_batch_size must be >= 1".to_string()));
        }
        if self.max_train_epochs == 0 {
            return Err(TrainingError::Validation("max_train_epochs must be >= 1".to_string()));
        }
        if self.save_every_n_epochs == 0 {
            return Err(TrainingError::Validation("save_every_n_epochs must be >= 1".to_string()));
        }
        if self.network_dim == 0 {
            return Err(TrainingError::Validation("network_dim must be >= 1".to_string()));
        }
        if self.network_alpha == 0 {
            return Err(TrainingError::Validation("network_alpha must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::Validation("learning_rate must be > 0".to_string()));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(TrainingError::Validation(
                "gradient_accumulation_steps must be >= 1".to_string(),
            ));
        }
        if let Some(path) = &self.resume_from {
            if !path.exists() {
                return Err(TrainingError::Validation(format!(
                    "resume checkpoint does not exist: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Translates the config into the external trainer's CLI argument list.
    ///
    /// The key-to-flag table mirrors the trainer's interface exactly. Fields
    /// with no entry here (noise/grad-norm tuning, accumulation steps) are
    /// persisted in `training_config.json` but not forwarded, matching the
    /// trainer versions this pack targets.
    #[must_use]
    pub fn to_trainer_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        let mut push_pair = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        push_pair("--train_data_dir", self.train_data_dir.display().to_string());
        push_pair("--output_dir", self.output_dir.display().to_string());
        push_pair("--logging_dir", self.logging_dir.display().to_string());
        push_pair("--resolution", self.resolution.to_string());
        push_pair("--train_batch_size", self.train_batch_size.to_string());
        push_pair("--max_train_epochs", self.max_train_epochs.to_string());
        push_pair("--save_every_n_epochs", self.save_every_n_epochs.to_string());
        push_pair("--network_dim", self.network_dim.to_string());
        push_pair("--network_alpha", self.network_alpha.to_string());
        push_pair("--network_module", self.network_module.clone());
        push_pair("--learning_rate", self.learning_rate.to_string());
        push_pair("--lr_scheduler", self.lr_scheduler.clone());
        push_pair("--lr_warmup_steps", self.lr_warmup_steps.to_string());
        push_pair("--optimizer_type", self.optimizer.as_arg().to_string());
        push_pair("--mixed_precision", self.mixed_precision.as_arg().to_string());
        if !self.output_name.is_empty() {
            push_pair("--output_name", self.output_name.clone());
        }
        push_pair("--save_model_as", self.save_format.as_arg().to_string());
        push_pair("--save_precision", self.save_precision.as_arg().to_string());

        if let Some(path) = &self.resume_from {
            push_pair("--resume", path.display().to_string());
        }
        if let Some(n) = self.sample_every_n_epochs {
            push_pair("--sample_every_n_epochs", n.to_string());
        }
        if let Some(prompts) = &self.sample_prompts {
            push_pair("--sample_prompts", prompts.clone());
        }

        for (key, value) in &self.extra {
            match value {
                ExtraValue::Bool(true) => args.push(format!("--{key}")),
                ExtraValue::Bool(false) => {}
                other => {
                    args.push(format!("--{key}"));
                    args.push(other.to_arg());
                }
            }
        }

        // Boolean flags appended only when enabled.
        if self.gradient_checkpointing {
            args.push("--gradient_checkpointing".to_string());
        }
        if self.enable_bucket {
            args.push("--enable_bucket".to_string());
        }
        if self.bucket_no_upscale {
            args.push("--bucket_no_upscale".to_string());
        }
        if self.save_state {
            args.push("--save_state".to_string());
        }
        if self.scale_v_pred_loss_like_noise_pred {
            args.push("--scale_v_pred_loss_like_noise_pred".to_string());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.train_data_dir = PathBuf::from("/data/02_conform");
        config.output_dir = PathBuf::from("/data/03_output");
        config.logging_dir = PathBuf::from("/data/03_output/logs");
        config.output_name = "bear_subject".to_string();
        config
    }

    #[test]
    fn test_validate_requires_paths() {
        let config = TrainingConfig::default();
        assert!(matches!(config.validate(), Err(TrainingError::Validation(_))));
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_numerics() {
        let mut config = configured();
        config.train_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.learning_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.learning_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trainer_args_mapping() {
        let args = configured().to_trainer_args();

        let value_of = |flag: &str| {
            let idx = args.iter().position(|a| a == flag).unwrap_or_else(|| panic!("{flag}"));
            args[idx + 1].clone()
        };

        assert_eq!(value_of("--train_data_dir"), "/data/02_conform");
        assert_eq!(value_of("--resolution"), "1024");
        assert_eq!(value_of("--train_batch_size"), "2");
        assert_eq!(value_of("--optimizer_type"), "AdamW8bit");
        assert_eq!(value_of("--mixed_precision"), "fp16");
        assert_eq!(value_of("--save_model_as"), "safetensors");
        assert_eq!(value_of("--output_name"), "bear_subject");

        // Boolean flags are bare and only present when enabled.
        assert!(args.contains(&"--gradient_checkpointing".to_string()));
        assert!(args.contains(&"--enable_bucket".to_string()));
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn test_trainer_args_optionals_and_extras() {
        let mut config = configured();
        config.sample_every_n_epochs = Some(5);
        config.extra.insert("seed".to_string(), ExtraValue::Int(42));
        config.extra.insert("xformers".to_string(), ExtraValue::Bool(true));
        config.extra.insert("cache_latents".to_string(), ExtraValue::Bool(false));

        let args = config.to_trainer_args();
        let seed_idx = args.iter().position(|a| a == "--seed").unwrap();
        assert_eq!(args[seed_idx + 1], "42");
        assert!(args.contains(&"--xformers".to_string()));
        assert!(!args.contains(&"--cache_latents".to_string()));
        assert!(args.contains(&"--sample_every_n_epochs".to_string()));
    }

    #[test]
    fn test_performance_modes() {
        let mut config = configured();
        config.apply_performance_mode(PerformanceMode::Quality);
        assert_eq!(config.train_batch_size, 1);
        assert_eq!(config.max_train_epochs, 25);
        assert_eq!(config.network_dim, 64);
        assert_eq!(config.gradient_accumulation_steps, 2);

        config.apply_performance_mode(PerformanceMode::Fast);
        assert_eq!(config.train_batch_size, 4);
        assert_eq!(config.network_dim, 16);
    }

    #[test]
    fn test_extra_value_inference() {
        assert_eq!(ExtraValue::parse("true"), ExtraValue::Bool(true));
        assert_eq!(ExtraValue::parse("False"), ExtraValue::Bool(false));
        assert_eq!(ExtraValue::parse("42"), ExtraValue::Int(42));
        assert_eq!(ExtraValue::parse("0.5"), ExtraValue::Float(0.5));
        assert_eq!(ExtraValue::parse("cosine"), ExtraValue::Text("cosine".to_string()));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = configured();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
