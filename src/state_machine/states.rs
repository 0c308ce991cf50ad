use serde::{Deserialize, Serialize};
use std::fmt;

/// Step state definitions for the dispatch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting to be claimed by a runner
    Pending,
    /// Claimed and currently executing
    Running,
    /// Work unit finished successfully
    Completed,
    /// Deliberately bypassed, counts as success for sequencing
    Skipped,
    /// Aborted by external decision
    Cancelled,
    /// Work unit raised an error
    Failed,
    /// Work unit was halted before finishing
    Stopped,
    /// Dormant recovery step, must be promoted before it can run
    NotRunnable,
}

impl StepState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Skipped | Self::Cancelled | Self::Failed | Self::Stopped
        )
    }

    /// Concluded with success: satisfies sequencing gates for successor indices
    pub fn is_concluded_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Concluded with failure
    pub fn is_concluded_failure(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Stopped)
    }

    /// Check if the step has concluded one way or the other
    pub fn is_concluded(&self) -> bool {
        self.is_concluded_success() || self.is_concluded_failure()
    }

    /// Check if this is an active state (a runner currently owns the step)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Only `Pending` steps may be selected by the dispatch query
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
            Self::NotRunnable => write!(f, "not_runnable"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            "not_runnable" => Ok(Self::NotRunnable),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

/// Default state for new default-type steps
impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}
