// State machine module for step dispatch
//
// Closed state set with an explicit transition table checked at write time
// via conditional UPDATE, so races between runners resolve to exactly one
// winner.

pub mod errors;
pub mod events;
pub mod states;
pub mod step_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::StepEvent;
pub use states::StepState;
pub use step_state_machine::StepStateMachine;
