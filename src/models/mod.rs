pub mod relatable;
pub mod step;
pub mod steps_dispatcher;
pub mod steps_dispatcher_tick;

pub use relatable::{RelatableRef, RelatableRegistry, RelatableRepository};
pub use step::{BlockSibling, NewStep, Step, StepType, DEFAULT_STEP_INDEX};
pub use steps_dispatcher::StepsDispatcher;
pub use steps_dispatcher_tick::StepsDispatcherTick;
