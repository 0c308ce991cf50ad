use thiserror::Error;

/// Errors raised while driving a step through its state machine
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Step {step_id} changed state concurrently (expected {expected})")]
    StaleState { step_id: i64, expected: String },

    #[error("Persistence failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event publish failed: {0}")]
    Event(String),
}

pub type StateMachineResult<T> = std::result::Result<T, StateMachineError>;
