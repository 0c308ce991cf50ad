//! # Step State Machine
//!
//! Drives a step through its lifecycle with an explicit transition table.
//! Every transition is persisted through a single conditional UPDATE whose
//! predicate re-checks the expected current state, so two runners racing on
//! the same step cannot both win: the loser sees zero affected rows and
//! gets a stale-state error instead of silently clobbering the winner.

use sqlx::PgPool;
use tracing::{debug, instrument};

use super::errors::{StateMachineError, StateMachineResult};
use super::events::StepEvent;
use super::states::StepState;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::Step;

pub struct StepStateMachine {
    step: Step,
    pool: PgPool,
    publisher: EventPublisher,
    hostname: String,
}

impl StepStateMachine {
    /// Create a state machine bound to one step. `hostname` identifies the
    /// worker and is stamped onto the step on its first entry to `Running`.
    pub fn new(step: Step, pool: PgPool, publisher: EventPublisher, hostname: String) -> Self {
        Self {
            step,
            pool,
            publisher,
            hostname,
        }
    }

    pub fn current_state(&self) -> StepState {
        self.step.state
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    /// The transition table. Pure: callers can probe legality without
    /// touching storage.
    pub fn determine_target_state(
        current: StepState,
        event: &StepEvent,
    ) -> StateMachineResult<StepState> {
        let target = match (current, event) {
            (StepState::Pending, StepEvent::Claim) => StepState::Running,

            (StepState::Running, StepEvent::Complete) => StepState::Completed,
            (StepState::Running, StepEvent::Skip) => StepState::Skipped,
            (StepState::Running, StepEvent::Fail { .. }) => StepState::Failed,
            (StepState::Running, StepEvent::Stop { .. }) => StepState::Stopped,

            // External abort is allowed from any non-terminal state.
            (state, StepEvent::Cancel) if !state.is_terminal() => StepState::Cancelled,

            // Recovery promotion wakes a dormant resolve-exception step.
            (StepState::NotRunnable, StepEvent::Promote) => StepState::Pending,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Attempt the transition and persist it.
    #[instrument(skip(self), fields(step_id = self.step.id, event = event.event_type()))]
    pub async fn transition(&mut self, event: StepEvent) -> StateMachineResult<StepState> {
        let current = self.step.state;
        let target = Self::determine_target_state(current, &event)?;

        let affected = self.persist(current, target, &event).await?;
        if affected == 0 {
            return Err(StateMachineError::StaleState {
                step_id: self.step.id,
                expected: current.to_string(),
            });
        }

        self.apply(target, &event);
        debug!(from = %current, to = %target, "Step transitioned");

        let context = serde_json::json!({
            "step_id": self.step.id,
            "block_uuid": self.step.block_uuid,
            "from": current.to_string(),
            "to": target.to_string(),
            "event": event.event_type(),
        });
        self.publisher
            .publish(events::STEP_TRANSITIONED, context)
            .await
            .map_err(|e| StateMachineError::Event(e.to_string()))?;

        Ok(target)
    }

    /// Write the transition with its per-state side effects in one
    /// conditional UPDATE. Returns the affected-row count.
    async fn persist(
        &self,
        current: StepState,
        target: StepState,
        event: &StepEvent,
    ) -> Result<u64, sqlx::Error> {
        let result = match target {
            // First entry to Running stamps start telemetry; COALESCE keeps
            // an earlier start from a prior claim intact.
            StepState::Running => {
                sqlx::query(
                    "UPDATE stepflow_steps \
                     SET state = $1, \
                         started_at = COALESCE(started_at, NOW()), \
                         hostname = COALESCE(hostname, $2), \
                         updated_at = NOW() \
                     WHERE id = $3 AND state = $4",
                )
                .bind(target.to_string())
                .bind(&self.hostname)
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }

            // Re-entering Pending clears the worker affinity: the step must
            // not stay sticky to a crashed or busy host.
            StepState::Pending => {
                sqlx::query(
                    "UPDATE stepflow_steps \
                     SET state = $1, hostname = NULL, updated_at = NOW() \
                     WHERE id = $2 AND state = $3",
                )
                .bind(target.to_string())
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }

            // Completion also clears any dispatch throttle.
            StepState::Completed => {
                sqlx::query(
                    "UPDATE stepflow_steps \
                     SET state = $1, \
                         completed_at = NOW(), \
                         duration = EXTRACT(EPOCH FROM (NOW() - started_at)), \
                         dispatch_after = NULL, \
                         updated_at = NOW() \
                     WHERE id = $2 AND state = $3",
                )
                .bind(target.to_string())
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }

            StepState::Skipped | StepState::Cancelled => {
                sqlx::query(
                    "UPDATE stepflow_steps \
                     SET state = $1, \
                         completed_at = NOW(), \
                         duration = EXTRACT(EPOCH FROM (NOW() - started_at)), \
                         updated_at = NOW() \
                     WHERE id = $2 AND state = $3",
                )
                .bind(target.to_string())
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }

            StepState::Failed | StepState::Stopped => {
                let stack_trace = match event {
                    StepEvent::Fail { stack_trace, .. } => stack_trace.clone(),
                    _ => None,
                };

                sqlx::query(
                    "UPDATE stepflow_steps \
                     SET state = $1, \
                         completed_at = NOW(), \
                         duration = EXTRACT(EPOCH FROM (NOW() - started_at)), \
                         error_message = $2, \
                         error_stack_trace = $3, \
                         updated_at = NOW() \
                     WHERE id = $4 AND state = $5",
                )
                .bind(target.to_string())
                .bind(event.error_message())
                .bind(stack_trace)
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }

            StepState::NotRunnable => {
                sqlx::query(
                    "UPDATE stepflow_steps SET state = $1, updated_at = NOW() \
                     WHERE id = $2 AND state = $3",
                )
                .bind(target.to_string())
                .bind(self.step.id)
                .bind(current.to_string())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }

    /// Mirror the persisted side effects onto the in-memory step
    fn apply(&mut self, target: StepState, event: &StepEvent) {
        let now = chrono::Utc::now();
        self.step.state = target;

        match target {
            StepState::Running => {
                self.step.started_at.get_or_insert(now);
                if self.step.hostname.is_none() {
                    self.step.hostname = Some(self.hostname.clone());
                }
            }
            StepState::Pending => {
                self.step.hostname = None;
            }
            StepState::Completed => {
                self.step.completed_at = Some(now);
                self.step.duration = self.elapsed_seconds(now);
                self.step.dispatch_after = None;
            }
            StepState::Skipped | StepState::Cancelled => {
                self.step.completed_at = Some(now);
                self.step.duration = self.elapsed_seconds(now);
            }
            StepState::Failed | StepState::Stopped => {
                self.step.completed_at = Some(now);
                self.step.duration = self.elapsed_seconds(now);
                self.step.error_message = event.error_message().map(str::to_string);
                if let StepEvent::Fail { stack_trace, .. } = event {
                    self.step.error_stack_trace = stack_trace.clone();
                }
            }
            StepState::NotRunnable => {}
        }
        self.step.updated_at = now;
    }

    fn elapsed_seconds(&self, now: chrono::DateTime<chrono::Utc>) -> Option<f64> {
        self.step
            .started_at
            .map(|started| (now - started).num_milliseconds() as f64 / 1000.0)
    }
}
