//! Incremental parsing of trainer output into structured progress.
//!
//! The external trainer only exposes its state through free-form log lines, so
//! progress is scraped with independent regex patterns. A single line may match
//! several patterns; malformed lines simply produce no updates.

use crate::status::TrainingStatus;
use once_cell::sync::Lazy;
use regex::Regex;

static EPOCH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"epoch (\d+)/(\d+)").expect("valid regex"));
static STEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"step (\d+)/(\d+)").expect("valid regex"));
static LOSS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"loss: ([\d.]+)").expect("valid regex"));
static LR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"lr: ([\d.eE+-]+)").expect("valid regex"));
static ETA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"eta: ([\d:]+)").expect("valid regex"));
static SAVING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"saving.*model").expect("valid regex"));
static ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error|exception|failed").expect("valid regex"));

/// Progress state of one training job.
///
/// Owned by a single [`TrainingSupervisor`](crate::supervisor::TrainingSupervisor)
/// and written only by its reader thread; other threads observe it through
/// cloned snapshots taken under the supervisor's lock.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingProgress {
    pub status: TrainingStatus,
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub current_step: u32,
    pub total_steps: u32,
    pub loss: Option<f64>,
    pub learning_rate: Option<f64>,
    /// Trainer-reported time remaining, verbatim (e.g. `01:23:45`).
    pub eta: Option<String>,
    /// Accumulated raw trainer output.
    pub log: String,
    pub error_message: String,
}

impl Default for TrainingProgress {
    fn default() -> Self {
        Self {
            status: TrainingStatus::Idle,
            current_epoch: 0,
            total_epochs: 0,
            current_step: 0,
            total_steps: 0,
            loss: None,
            learning_rate: None,
            eta: None,
            log: String::new(),
            error_message: String::new(),
        }
    }
}

impl TrainingProgress {
    /// Applies one line of trainer output.
    ///
    /// Returns `true` if at least one field was updated. Unrecognized lines
    /// produce no updates and never fail. A terminal status is immutable:
    /// output drained after it is set is ignored.
    pub fn apply_line(&mut self, line: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let mut updated = false;

        if let Some(caps) = EPOCH_RE.captures(line) {
            if let (Ok(current), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
                self.current_epoch = current;
                self.total_epochs = total;
                updated = true;
            }
        }

        if let Some(caps) = STEP_RE.captures(line) {
            if let (Ok(current), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
                self.current_step = current;
                self.total_steps = total;
                updated = true;
            }
        }

        // A progress line while a checkpoint save was in flight means the
        // trainer resumed normal operation.
        if updated && self.status == TrainingStatus::Saving {
            self.status = TrainingStatus::Training;
        }

        if let Some(caps) = LOSS_RE.captures(line) {
            if let Ok(value) = caps[1].parse() {
                self.loss = Some(value);
                updated = true;
            }
        }

        if let Some(caps) = LR_RE.captures(line) {
            if let Ok(value) = caps[1].parse() {
                self.learning_rate = Some(value);
                updated = true;
            }
        }

        if let Some(caps) = ETA_RE.captures(line) {
            self.eta = Some(caps[1].to_string());
            updated = true;
        }

        if SAVING_RE.is_match(line) {
            self.status = TrainingStatus::Saving;
            updated = true;
        }

        if ERROR_RE.is_match(line) {
            // Recorded for the terminal resolution only. The status stays
            // non-terminal while the process runs: the exit code is
            // authoritative and may still resolve the job as completed.
            self.error_message = line.trim().to_string();
            updated = true;
        }

        updated
    }

    /// Overall progress in percent, clamped to `[0, 100]`.
    ///
    /// Falls back to epoch-only granularity until the trainer has printed a
    /// step total. This is an estimate: it assumes a stable per-epoch step
    /// count.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.total_epochs == 0 {
            return 0.0;
        }

        let epoch_progress =
            f64::from(self.current_epoch.saturating_sub(1)) / f64::from(self.total_epochs);
        if self.total_steps > 0 {
            let step_progress = f64::from(self.current_step)
                / f64::from(self.total_steps)
                / f64::from(self.total_epochs);
            return ((epoch_progress + step_progress) * 100.0).clamp(0.0, 100.0);
        }

        (epoch_progress * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_epoch_step_loss_sequence() {
        let mut progress = TrainingProgress::default();
        assert!(progress.apply_line("epoch 3/10"));
        assert!(progress.apply_line("step 45/100"));
        assert!(progress.apply_line("loss: 0.0234"));

        assert_eq!(progress.current_epoch, 3);
        assert_eq!(progress.total_epochs, 10);
        assert_eq!(progress.current_step, 45);
        assert_eq!(progress.total_steps, 100);
        assert_eq!(progress.loss, Some(0.0234));
        assert!((progress.percent_complete() - 24.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_line_matches_multiple_patterns() {
        let mut progress = TrainingProgress::default();
        assert!(progress.apply_line("epoch 1/5 step 10/50 loss: 0.9 lr: 1e-4"));
        assert_eq!(progress.current_epoch, 1);
        assert_eq!(progress.current_step, 10);
        assert_eq!(progress.loss, Some(0.9));
        assert_eq!(progress.learning_rate, Some(1e-4));
    }

    #[test]
    fn test_malformed_lines_yield_no_updates() {
        let mut progress = TrainingProgress::default();
        assert!(!progress.apply_line(""));
        assert!(!progress.apply_line("prepare accelerator"));
        assert!(!progress.apply_line("epoch three/ten"));
        assert_eq!(progress, TrainingProgress::default());
    }

    #[test]
    fn test_saving_toggles_back_to_training() {
        let mut progress = TrainingProgress::default();
        progress.status = TrainingStatus::Training;

        assert!(progress.apply_line("saving checkpoint model to out.safetensors"));
        assert_eq!(progress.status, TrainingStatus::Saving);

        assert!(progress.apply_line("epoch 2/10"));
        assert_eq!(progress.status, TrainingStatus::Training);
    }

    #[test]
    fn test_error_keywords_are_case_insensitive() {
        for line in ["ERROR: out of memory", "Exception in thread", "training FAILED"] {
            let mut progress = TrainingProgress::default();
            progress.status = TrainingStatus::Training;
            assert!(progress.apply_line(line));
            assert_eq!(progress.error_message, line.trim());
        }
    }

    #[test]
    fn test_error_line_does_not_terminate_a_running_job() {
        let mut progress = TrainingProgress::default();
        progress.status = TrainingStatus::Training;

        assert!(progress.apply_line("warning: error recovered, continuing"));
        assert_eq!(progress.status, TrainingStatus::Training);
        assert!(!progress.status.is_terminal());
        assert_eq!(progress.error_message, "warning: error recovered, continuing");

        // Training keeps progressing past the recorded error line.
        assert!(progress.apply_line("epoch 2/10"));
        assert_eq!(progress.current_epoch, 2);
    }

    #[test]
    fn test_terminal_status_ignores_drained_lines() {
        let mut progress = TrainingProgress::default();
        progress.status = TrainingStatus::Stopped;

        assert!(!progress.apply_line("error: torn down mid-write"));
        assert!(!progress.apply_line("epoch 9/10"));
        assert!(!progress.apply_line("saving final model"));

        assert_eq!(progress.status, TrainingStatus::Stopped);
        assert_eq!(progress.current_epoch, 0);
        assert!(progress.error_message.is_empty());
    }

    #[test]
    fn test_parses_eta() {
        let mut progress = TrainingProgress::default();
        assert!(progress.apply_line("step 3/100, loss: 0.21, eta: 01:23:45"));
        assert_eq!(progress.eta.as_deref(), Some("01:23:45"));
    }

    #[test]
    fn test_progress_zero_without_epoch_total() {
        let mut progress = TrainingProgress::default();
        progress.apply_line("step 45/100");
        assert!(progress.percent_complete().abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_epoch_only_granularity() {
        let mut progress = TrainingProgress::default();
        progress.apply_line("epoch 6/10");
        assert!((progress.percent_complete() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let mut progress = TrainingProgress::default();
        progress.apply_line("epoch 10/10");
        // Step count inflated mid-run; percentage must never exceed 100.
        progress.apply_line("step 500/100");
        assert!((progress.percent_complete() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_epoch_and_step() {
        let mut progress = TrainingProgress::default();
        let lines =
            ["epoch 1/4", "step 1/20", "step 7/20", "epoch 2/4", "step 3/20", "epoch 3/4"];
        let mut last_epoch = 0;
        for line in lines {
            progress.apply_line(line);
            assert!(progress.current_epoch >= last_epoch);
            last_epoch = progress.current_epoch;
        }
    }
}
