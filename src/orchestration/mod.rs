//! # Orchestration
//!
//! The services runners compose into a dispatch loop: group-fair lock
//! claiming with tick accounting, dispatchable-step discovery, and the
//! creation entry point with its defaults and group inheritance.

pub mod dispatcher;
pub mod group_allocator;
pub mod step_creator;
pub mod step_discovery;

pub use dispatcher::{DispatchError, Dispatcher};
pub use group_allocator::{GroupAllocator, DEFAULT_GROUP};
pub use step_creator::StepCreator;
pub use step_discovery::StepDiscovery;
