//! # Dispatcher
//!
//! Fair multi-group locking over the shared store. A runner asks which
//! group may dispatch next (the one that has waited longest), claims its
//! advisory lock with a single conditional UPDATE, opens an accounting
//! tick, executes dispatchable steps, and closes the cycle.
//!
//! There is no lock service and no blocking primitive: failure to acquire
//! is zero affected rows, contention is resolved by polling another group,
//! and a holder that dies is healed by the stuck-lock failsafe on the next
//! attempt. Replacing this with a blocking lock would silently drop that
//! self-healing property.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use crate::config::{DeadlockRetryConfig, DispatcherConfig};
use crate::constants::events;
use crate::database::with_deadlock_retry;
use crate::events::EventPublisher;
use crate::models::{StepsDispatcher, StepsDispatcherTick};

/// Errors raised by the dispatch lock cycle
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch storage failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No lock row exists for group {group}")]
    LockRowMissing { group: String },

    #[error("No open tick for group {group}")]
    TickNotOpen { group: String },
}

pub struct Dispatcher {
    pool: PgPool,
    config: DispatcherConfig,
    retry: DeadlockRetryConfig,
    publisher: EventPublisher,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        config: DispatcherConfig,
        retry: DeadlockRetryConfig,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            pool,
            config,
            retry,
            publisher,
        }
    }

    /// The group a runner should try next: among unclaimed lock rows, the
    /// one with the oldest `updated_at`, ties broken by ID. Returns `None`
    /// when every group is currently claimed.
    #[instrument(skip(self))]
    pub async fn get_dispatch_group(&self) -> Result<Option<StepsDispatcher>, DispatchError> {
        let row = StepsDispatcher::next_dispatchable(&self.pool).await?;

        match &row {
            Some(dispatcher) => debug!(
                group = %group_label(dispatcher.group_name.as_deref()),
                "Offering dispatch group"
            ),
            None => debug!("All dispatch groups are claimed"),
        }

        Ok(row)
    }

    /// Try to claim a group's dispatch lock. Returns whether the claim
    /// succeeded; callers must not dispatch when it did not.
    #[instrument(skip(self), fields(group = %group_label(group)))]
    pub async fn start_dispatch(&self, group: Option<&str>) -> Result<bool, DispatchError> {
        let row = StepsDispatcher::find_or_create(&self.pool, group).await?;

        // Failsafe: a holder that crashed leaves the flag down forever.
        // Anything locked and untouched past the timeout is reclaimed here.
        let released = StepsDispatcher::release_if_stale(
            &self.pool,
            row.id,
            self.config.stuck_lock_timeout_seconds,
        )
        .await?;
        if released {
            warn!(
                group = %group_label(group),
                timeout_seconds = self.config.stuck_lock_timeout_seconds,
                "Released stuck dispatch lock"
            );
            self.publish_lossy(
                events::DISPATCHER_STALE_LOCK_RELEASED,
                serde_json::json!({ "group": group }),
            )
            .await;
        }

        let claimed = with_deadlock_retry(&self.retry, "dispatcher.claim", || {
            StepsDispatcher::try_claim(&self.pool, row.id)
        })
        .await?;
        if !claimed {
            debug!(group = %group_label(group), "Dispatch lock not acquired");
            return Ok(false);
        }

        let tick = StepsDispatcherTick::open(&self.pool, group).await?;
        StepsDispatcher::link_tick(&self.pool, row.id, tick.id).await?;

        debug!(group = %group_label(group), tick_id = tick.id, "Dispatch cycle opened");
        self.publish_lossy(
            events::DISPATCHER_TICK_OPENED,
            serde_json::json!({ "group": group, "tick_id": tick.id }),
        )
        .await;

        Ok(true)
    }

    /// Close the current dispatch cycle: persist tick accounting, raise the
    /// backpressure warning when the cycle ran long, release the lock.
    #[instrument(skip(self), fields(group = %group_label(group)))]
    pub async fn end_dispatch(&self, progress: i32, group: Option<&str>) -> Result<(), DispatchError> {
        let row = StepsDispatcher::find_by_group(&self.pool, group)
            .await?
            .ok_or_else(|| DispatchError::LockRowMissing {
                group: group_label(group),
            })?;

        let tick_id = row.current_tick_id.ok_or_else(|| DispatchError::TickNotOpen {
            group: group_label(group),
        })?;
        let tick = StepsDispatcherTick::find_by_id(&self.pool, tick_id)
            .await?
            .ok_or_else(|| DispatchError::TickNotOpen {
                group: group_label(group),
            })?;

        let duration = (Utc::now() - tick.started_at).num_milliseconds() as f64 / 1000.0;
        StepsDispatcherTick::close(&self.pool, tick_id, duration, progress).await?;

        if duration > self.config.long_tick_threshold_seconds {
            // The worker pool is falling behind; the cycle still closes
            // normally.
            warn!(
                group = %group_label(group),
                duration_seconds = duration,
                threshold_seconds = self.config.long_tick_threshold_seconds,
                progress = progress,
                "Dispatch tick exceeded threshold"
            );
            self.publish_lossy(
                events::DISPATCHER_LONG_TICK,
                serde_json::json!({
                    "group": group,
                    "tick_id": tick_id,
                    "duration_seconds": duration,
                    "progress": progress,
                }),
            )
            .await;
        }

        with_deadlock_retry(&self.retry, "dispatcher.release", || {
            StepsDispatcher::release(&self.pool, row.id)
        })
        .await?;

        info!(
            group = %group_label(group),
            tick_id = tick_id,
            duration_seconds = duration,
            progress = progress,
            "Dispatch cycle closed"
        );
        self.publish_lossy(
            events::DISPATCHER_TICK_CLOSED,
            serde_json::json!({
                "group": group,
                "tick_id": tick_id,
                "duration_seconds": duration,
                "progress": progress,
            }),
        )
        .await;

        Ok(())
    }

    /// Coordination telemetry must never wedge the lock cycle; publish
    /// failures are logged and dropped.
    async fn publish_lossy(&self, event_name: &str, context: serde_json::Value) {
        if let Err(error) = self.publisher.publish(event_name, context).await {
            warn!(event = event_name, error = %error, "Failed to publish dispatcher event");
        }
    }
}

fn group_label(group: Option<&str>) -> String {
    group.unwrap_or("<global>").to_string()
}
