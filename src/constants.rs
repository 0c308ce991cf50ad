//! # System Constants
//!
//! Event names and state groupings shared across the dispatch core.

/// Core events published on the event bus as steps and ticks move through
/// their lifecycles
pub mod events {
    // Step lifecycle events
    pub const STEP_CREATED: &str = "step.created";
    pub const STEP_TRANSITIONED: &str = "step.transitioned";
    pub const STEP_EXECUTION_TIMEOUT: &str = "step.execution_timeout";
    pub const STEP_THROTTLED: &str = "step.throttled";

    // Dispatcher lifecycle events
    pub const DISPATCHER_TICK_OPENED: &str = "dispatcher.tick_opened";
    pub const DISPATCHER_TICK_CLOSED: &str = "dispatcher.tick_closed";
    pub const DISPATCHER_LONG_TICK: &str = "dispatcher.long_tick";
    pub const DISPATCHER_STALE_LOCK_RELEASED: &str = "dispatcher.stale_lock_released";
}

/// State groupings used by sequencing gates and reporting
pub mod status_groups {
    use crate::state_machine::StepState;

    /// States that satisfy sequencing gates for successor indices
    pub const CONCLUDED_SUCCESS: [StepState; 2] = [StepState::Completed, StepState::Skipped];

    /// States that conclude a step without satisfying its successors
    pub const CONCLUDED_FAILURE: [StepState; 3] =
        [StepState::Cancelled, StepState::Failed, StepState::Stopped];
}
