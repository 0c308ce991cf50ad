use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum StepflowError {
    DatabaseError(String),
    StateTransitionError(String),
    DispatchError(String),
    ValidationError(String),
    ConfigurationError(String),
    EventError(String),
}

impl fmt::Display for StepflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepflowError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            StepflowError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            StepflowError::DispatchError(msg) => write!(f, "Dispatch error: {msg}"),
            StepflowError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            StepflowError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            StepflowError::EventError(msg) => write!(f, "Event error: {msg}"),
        }
    }
}

impl std::error::Error for StepflowError {}

pub type Result<T> = std::result::Result<T, StepflowError>;
