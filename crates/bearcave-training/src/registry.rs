//! Concurrent registry of training jobs, keyed by output path.
//!
//! The registry is the caller-facing surface for the node-graph executor: it
//! is polled from a scheduling loop, so every operation returns promptly and
//! folds failures into a discriminated [`JobStatus`] instead of erroring
//! across the boundary. At most one job per identity; repeated starts are
//! treated as polls.

use crate::artifacts;
use crate::config::TrainingConfig;
use crate::progress::TrainingProgress;
use crate::status::TrainingStatus;
use crate::supervisor::{ProgressCallback, TrainerCommand, TrainingSupervisor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stable job identity derived from the job's output directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Identical output path always yields an identical identity.
    #[must_use]
    pub fn for_output_path(output_path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output_path.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..8].to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Final snapshot of a finished job, produced exactly once at the transition
/// into a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: TrainingStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_epoch: u32,
    pub total_epochs: u32,
    pub final_step: u32,
    pub total_steps: u32,
    pub final_loss: Option<f64>,
    pub duration_seconds: f64,
    /// Newest trained model file, if the trainer wrote any.
    pub model_path: Option<PathBuf>,
    pub model_paths: Vec<PathBuf>,
    pub model_size_mb: f64,
    pub sample_images: Vec<PathBuf>,
    pub log: String,
    /// Empty on success.
    pub error_message: String,
}

/// Discriminated status returned by every registry operation.
#[derive(Debug)]
pub enum JobStatus {
    /// No job is registered for the identity.
    Inactive { message: String },
    /// A job is registered and has not reached a terminal state.
    Active(TrainingProgress),
    /// The job reached a terminal state; its entry has been removed.
    Finished(Box<JobResult>),
    /// The request was rejected (validation, launch, or stop failure).
    Rejected { error: String },
}

struct RegistryEntry {
    supervisor: TrainingSupervisor,
    config: TrainingConfig,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of active training jobs.
///
/// Explicitly constructed and owned by the caller; guarded by a single
/// coarse lock (job counts are small and operations rare next to the reader
/// threads' per-line work). Lock order is always registry before supervisor
/// state.
pub struct TrainingRegistry {
    command: TrainerCommand,
    jobs: Mutex<HashMap<JobId, RegistryEntry>>,
}

impl fmt::Debug for TrainingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingRegistry")
            .field("command", &self.command)
            .field("job_count", &lock(&self.jobs).len())
            .finish_non_exhaustive()
    }
}

impl TrainingRegistry {
    #[must_use]
    pub fn new(command: TrainerCommand) -> Self {
        Self { command, jobs: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub fn command(&self) -> &TrainerCommand {
        &self.command
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// Starts a job for `id`, or returns the current status if one is
    /// already registered. At-most-one job per identity is enforced here:
    /// a repeated start is a poll, not an error.
    pub fn start_or_get(
        &self,
        id: &JobId,
        config: TrainingConfig,
        on_update: Option<ProgressCallback>,
    ) -> JobStatus {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(id) {
            debug!(job_id = %id, "job already registered, treating start as poll");
            return Self::poll_entry(&mut jobs, id);
        }

        if let Err(e) = config.validate() {
            warn!(job_id = %id, error = %e, "training config rejected");
            return JobStatus::Rejected { error: e.to_string() };
        }

        let supervisor = TrainingSupervisor::new(self.command.clone());
        if let Err(e) = supervisor.prepare(&config).and_then(|_| supervisor.start(&config, on_update))
        {
            warn!(job_id = %id, error = %e, "failed to start training job");
            return JobStatus::Rejected { error: e.to_string() };
        }

        let snapshot = supervisor.poll();
        info!(job_id = %id, output_dir = %config.output_dir.display(), "training job registered");
        jobs.insert(
            id.clone(),
            RegistryEntry {
                supervisor,
                config,
                started_at: Instant::now(),
                started_at_utc: Utc::now(),
            },
        );
        JobStatus::Active(snapshot)
    }

    /// Latest status for `id`. When a terminal state is observed the final
    /// result is packaged, persisted best-effort, and the entry removed.
    pub fn poll(&self, id: &JobId) -> JobStatus {
        let mut jobs = lock(&self.jobs);
        Self::poll_entry(&mut jobs, id)
    }

    /// Stops the job for `id`. On failure the entry is left untouched.
    pub fn stop(&self, id: &JobId) -> JobStatus {
        let mut jobs = lock(&self.jobs);
        let Some(entry) = jobs.get(id) else {
            return JobStatus::Rejected { error: "no active training job to stop".to_string() };
        };

        if let Err(e) = entry.supervisor.stop() {
            warn!(job_id = %id, error = %e, "failed to stop training job");
            return JobStatus::Rejected { error: e.to_string() };
        }

        info!(job_id = %id, "training job stopped");
        match jobs.remove(id) {
            Some(entry) => JobStatus::Finished(Box::new(Self::package_result(&entry))),
            None => JobStatus::Inactive { message: "no active training job".to_string() },
        }
    }

    fn poll_entry(jobs: &mut HashMap<JobId, RegistryEntry>, id: &JobId) -> JobStatus {
        let Some(entry) = jobs.get(id) else {
            return JobStatus::Inactive { message: "no active training job".to_string() };
        };

        let snapshot = entry.supervisor.poll();
        if !snapshot.status.is_terminal() {
            return JobStatus::Active(snapshot);
        }

        match jobs.remove(id) {
            Some(entry) => {
                let result = Self::package_result(&entry);
                info!(job_id = %id, status = %result.status, "training job finished");
                JobStatus::Finished(Box::new(result))
            }
            None => JobStatus::Inactive { message: "no active training job".to_string() },
        }
    }

    fn package_result(entry: &RegistryEntry) -> JobResult {
        let snapshot = entry.supervisor.poll();
        let model_paths = artifacts::find_output_models(&entry.config.output_dir);
        let model_path = model_paths.first().cloned();
        let model_size_mb = model_path.as_deref().map_or(0.0, artifacts::model_size_mb);
        let sample_images = artifacts::find_sample_images(&entry.config.output_dir);

        let result = JobResult {
            status: snapshot.status,
            started_at: entry.started_at_utc,
            finished_at: Utc::now(),
            final_epoch: snapshot.current_epoch,
            total_epochs: snapshot.total_epochs,
            final_step: snapshot.current_step,
            total_steps: snapshot.total_steps,
            final_loss: snapshot.loss,
            duration_seconds: entry.started_at.elapsed().as_secs_f64(),
            model_path,
            model_paths,
            model_size_mb,
            sample_images,
            log: snapshot.log,
            error_message: snapshot.error_message,
        };

        // Best effort: a failed write never fails the poll.
        let results_path = entry.config.output_dir.join("training_results.json");
        match serde_json::to_vec_pretty(&result).map(|bytes| std::fs::write(&results_path, bytes)) {
            Ok(Ok(())) => debug!(path = %results_path.display(), "wrote training results"),
            Ok(Err(e)) => warn!(error = %e, "could not persist training results"),
            Err(e) => warn!(error = %e, "could not serialize training results"),
        }

        result
    }
}
