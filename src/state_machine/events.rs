use serde::{Deserialize, Serialize};

/// Events that can trigger step state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// A runner claims the step for execution
    Claim,
    /// Mark the step as completed successfully
    Complete,
    /// Bypass the step, counting it as success for sequencing
    Skip,
    /// Mark the step as failed with an error message and optional stack trace
    Fail {
        message: String,
        stack_trace: Option<String>,
    },
    /// Halt the step before it finished
    Stop { message: Option<String> },
    /// Abort the step by external decision
    Cancel,
    /// Promote a dormant recovery step so it becomes dispatchable
    Promote,
}

impl StepEvent {
    /// String representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Complete => "complete",
            Self::Skip => "skip",
            Self::Fail { .. } => "fail",
            Self::Stop { .. } => "stop",
            Self::Cancel => "cancel",
            Self::Promote => "promote",
        }
    }

    /// Extract the error message if this event carries one
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail { message, .. } => Some(message),
            Self::Stop { message } => message.as_deref(),
            _ => None,
        }
    }
}
