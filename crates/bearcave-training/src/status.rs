//! Training job lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a training job.
///
/// `Completed`, `Error`, and `Stopped` are terminal: no transition leaves them.
/// A new job requires a new supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    /// No start call has been made yet.
    Idle,
    /// Environment preparation and process spawn.
    Starting,
    /// Trainer process is running normally.
    Training,
    /// Trainer is writing a checkpoint; returns to `Training` afterwards.
    Saving,
    /// Trainer exited with code zero.
    Completed,
    /// Trainer exited nonzero, or an error line was observed and it then exited.
    Error,
    /// Caller-requested termination succeeded.
    Stopped,
}

impl TrainingStatus {
    /// Returns `true` if no further transition is possible from this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    /// Checks if the job can transition to the given state.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // Same state is always valid
            (a, b) if *a == b => true,
            (Self::Idle, Self::Starting) => true,
            (Self::Starting, Self::Training | Self::Error | Self::Stopped) => true,
            // Training toggles with Saving and can end any way
            (Self::Training, Self::Saving | Self::Completed | Self::Error | Self::Stopped) => true,
            (Self::Saving, Self::Training | Self::Completed | Self::Error | Self::Stopped) => true,
            // Terminal states never transition
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Training => "training",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TrainingStatus::Completed.is_terminal());
        assert!(TrainingStatus::Error.is_terminal());
        assert!(TrainingStatus::Stopped.is_terminal());
        assert!(!TrainingStatus::Idle.is_terminal());
        assert!(!TrainingStatus::Training.is_terminal());
        assert!(!TrainingStatus::Saving.is_terminal());
    }

    #[test]
    fn test_state_transitions() {
        // Idle only starts
        assert!(TrainingStatus::Idle.can_transition_to(TrainingStatus::Starting));
        assert!(!TrainingStatus::Idle.can_transition_to(TrainingStatus::Training));

        // Starting transitions
        assert!(TrainingStatus::Starting.can_transition_to(TrainingStatus::Training));
        assert!(TrainingStatus::Starting.can_transition_to(TrainingStatus::Error));
        assert!(!TrainingStatus::Starting.can_transition_to(TrainingStatus::Completed));

        // Training <-> Saving toggle
        assert!(TrainingStatus::Training.can_transition_to(TrainingStatus::Saving));
        assert!(TrainingStatus::Saving.can_transition_to(TrainingStatus::Training));

        // Terminal states are dead ends
        assert!(!TrainingStatus::Completed.can_transition_to(TrainingStatus::Training));
        assert!(!TrainingStatus::Error.can_transition_to(TrainingStatus::Idle));
        assert!(!TrainingStatus::Stopped.can_transition_to(TrainingStatus::Starting));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TrainingStatus::Saving.to_string(), "saving");
        assert_eq!(TrainingStatus::Completed.as_str(), "completed");
    }
}
