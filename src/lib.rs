#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stepflow Core
//!
//! Job-orchestration backbone for an automated multi-exchange trading
//! platform. Every trading operation is expressed as discrete **steps**
//! organized into **blocks**, dispatched by competing worker processes
//! pulling from shared PostgreSQL storage. Relational rows are the
//! coordination substrate; there is no message broker.
//!
//! ## Architecture
//!
//! - Steps carry an index inside their block; index order is strict
//!   happens-before, equal indices run in parallel, and a step may spawn a
//!   nested child block it then waits on.
//! - Each step belongs to a dispatch **group** (a worker-pool partition)
//!   with one advisory lock row. The lock is a boolean flag mutated only
//!   through conditional UPDATEs; `updated_at` staleness doubles as a
//!   fairness queue across groups.
//! - Every claim-to-release cycle is recorded as a **tick**, the audit
//!   anchor for the long-cycle backpressure warning.
//! - Crashed holders self-heal: a lock untouched past the stuck-lock
//!   timeout is force-released by the next caller.
//!
//! ## Module Organization
//!
//! - [`models`] - Steps, dispatcher lock rows, ticks, relatable references
//! - [`state_machine`] - The step lifecycle with write-time-checked transitions
//! - [`orchestration`] - Dispatcher, step discovery, step creation
//! - [`database`] - Connections, migrations, deadlock-safe writes
//! - [`events`] - Lifecycle event publishing / notification sink
//! - [`config`] - Injected configuration for every tunable
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepflow_core::config::ConfigManager;
//! use stepflow_core::database::DatabaseConnection;
//! use stepflow_core::events::EventPublisher;
//! use stepflow_core::models::NewStep;
//! use stepflow_core::orchestration::{Dispatcher, GroupAllocator, StepCreator, StepDiscovery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! stepflow_core::logging::init_logging(&config.logging);
//!
//! let db = DatabaseConnection::connect(&config.database).await?;
//! let publisher = EventPublisher::default();
//!
//! let creator = StepCreator::new(
//!     db.pool().clone(),
//!     GroupAllocator::new(config.dispatcher.groups.clone()),
//!     publisher.clone(),
//! );
//! let step = creator
//!     .create_step(NewStep::new(
//!         "orders::PlaceOrder",
//!         serde_json::json!({"symbol": "BTC-USDT"}),
//!         "trading",
//!     ))
//!     .await?;
//!
//! let dispatcher = Dispatcher::new(
//!     db.pool().clone(),
//!     config.dispatcher.clone(),
//!     config.retry.clone(),
//!     publisher.clone(),
//! );
//! let discovery = StepDiscovery::new(db.pool().clone());
//!
//! if let Some(row) = dispatcher.get_dispatch_group().await? {
//!     let group = row.group_name.as_deref();
//!     if dispatcher.start_dispatch(group).await? {
//!         let steps = discovery.dispatchable_steps(group).await?;
//!         // ... execute work units, drive their state machines ...
//!         dispatcher.end_dispatch(steps.len() as i32, group).await?;
//!     }
//! }
//! # let _ = step;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;

pub use config::{
    ConfigManager, DatabaseConfig, DeadlockRetryConfig, DispatcherConfig, LoggingConfig,
    StepflowConfig,
};
pub use error::{Result, StepflowError};
pub use models::{
    NewStep, RelatableRef, Step, StepType, StepsDispatcher, StepsDispatcherTick,
};
pub use state_machine::{StepEvent, StepState, StepStateMachine};
