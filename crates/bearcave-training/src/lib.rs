//! Bearcave Training
//!
//! LoRA training job lifecycle primitives for the Bearcave node pack:
//! - Strongly typed training configuration + trainer CLI translation (`TrainingConfig`)
//! - Incremental trainer-output scraping (`TrainingProgress`)
//! - Subprocess supervision with a dedicated reader thread (`TrainingSupervisor`)
//! - A concurrent job registry keyed by output path (`TrainingRegistry`)

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layout;
pub mod progress;
pub mod registry;
pub mod status;
pub mod supervisor;

pub use artifacts::{find_output_models, find_sample_images, model_size_mb, MODEL_EXTENSIONS};
pub use config::{ExtraValue, OptimizerKind, PerformanceMode, PrecisionMode, SaveFormat, TrainingConfig};
pub use dataset::{count_images, find_images, is_image_file, IMAGE_EXTENSIONS};
pub use error::{TrainingError, TrainingResult};
pub use layout::ProjectLayout;
pub use progress::TrainingProgress;
pub use registry::{JobId, JobResult, JobStatus, TrainingRegistry};
pub use status::TrainingStatus;
pub use supervisor::{ProgressCallback, TrainerCommand, TrainingSupervisor};
