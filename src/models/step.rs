//! # Step Model
//!
//! A step is one discrete unit of work: which class to execute with which
//! arguments, where it sits inside its block, which dispatch group it
//! belongs to, and where it is in its lifecycle.
//!
//! ## Blocks and sequencing
//!
//! Steps sharing a `block_uuid` form a block, ordered by `step_index`.
//! A step at index n only becomes dispatchable once every index n-1 step of
//! its gate type has concluded with success; equal indices run in parallel.
//! A pending `resolve-exception` step in the block switches the gate to the
//! recovery path so an error-handling sub-flow can preempt the normal
//! sequence without renumbering.
//!
//! ## Nesting
//!
//! A step with a `child_block_uuid` is a parent: it spawns a nested block
//! and only counts its children as concluded once every descendant step has
//! concluded with success. An empty child block means "not yet spawned",
//! never "nothing to wait for".
//!
//! ## Ownership
//!
//! `relatable_kind`/`relatable_id` point at the external domain object the
//! step acts on. The reference is opaque to this core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::relatable::RelatableRef;
use crate::state_machine::StepState;

/// Default ordering position inside a block
pub const DEFAULT_STEP_INDEX: i32 = 1;

/// Classification of a step's role inside its block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    /// Regular unit of work, selected by the dispatch query
    Default,
    /// Dormant recovery unit, promoted to `Pending` after a failure
    ResolveException,
}

impl StepType {
    /// Initial state for a freshly created step of this type
    pub fn initial_state(&self) -> StepState {
        match self {
            Self::Default => StepState::Pending,
            Self::ResolveException => StepState::NotRunnable,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::ResolveException => write!(f, "resolve-exception"),
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "resolve-exception" => Ok(Self::ResolveException),
            _ => Err(format!("Invalid step type: {s}")),
        }
    }
}

impl Default for StepType {
    fn default() -> Self {
        Self::Default
    }
}

/// One unit of work plus its position in a block and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub block_uuid: Uuid,
    pub child_block_uuid: Option<Uuid>,
    pub step_index: i32,
    pub step_type: StepType,
    pub class: String,
    pub arguments: serde_json::Value,
    pub queue: String,
    pub group_name: String,
    pub priority: i32,
    pub state: StepState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
    pub hostname: Option<String>,
    pub retries: i32,
    pub dispatch_after: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_stack_trace: Option<String>,
    pub was_notified: bool,
    pub relatable_kind: Option<String>,
    pub relatable_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const STEP_COLUMNS: &str = "id, block_uuid, child_block_uuid, step_index, step_type, class, \
     arguments, queue, group_name, priority, state, started_at, completed_at, duration, \
     hostname, retries, dispatch_after, error_message, error_stack_trace, was_notified, \
     relatable_kind, relatable_id, created_at, updated_at";

impl FromRow<'_, PgRow> for Step {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let step_type: String = row.try_get("step_type")?;

        Ok(Self {
            id: row.try_get("id")?,
            block_uuid: row.try_get("block_uuid")?,
            child_block_uuid: row.try_get("child_block_uuid")?,
            step_index: row.try_get("step_index")?,
            step_type: step_type
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            class: row.try_get("class")?,
            arguments: row.try_get("arguments")?,
            queue: row.try_get("queue")?,
            group_name: row.try_get("group_name")?,
            priority: row.try_get("priority")?,
            state: state
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration: row.try_get("duration")?,
            hostname: row.try_get("hostname")?,
            retries: row.try_get("retries")?,
            dispatch_after: row.try_get("dispatch_after")?,
            error_message: row.try_get("error_message")?,
            error_stack_trace: row.try_get("error_stack_trace")?,
            was_notified: row.try_get("was_notified")?,
            relatable_kind: row.try_get("relatable_kind")?,
            relatable_id: row.try_get("relatable_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// New step for creation. Omitted fields are resolved by creation-time
/// defaults: a missing block becomes a fresh one, a missing or zero index
/// becomes [`DEFAULT_STEP_INDEX`], and a missing group is inherited from
/// the workflow tree or freshly allocated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStep {
    pub class: String,
    pub arguments: serde_json::Value,
    pub queue: String,
    pub block_uuid: Option<Uuid>,
    pub child_block_uuid: Option<Uuid>,
    pub step_index: Option<i32>,
    pub step_type: StepType,
    pub group: Option<String>,
    pub priority: Option<i32>,
    pub dispatch_after: Option<DateTime<Utc>>,
    pub relatable: Option<RelatableRef>,
}

impl NewStep {
    pub fn new(
        class: impl Into<String>,
        arguments: serde_json::Value,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            arguments,
            queue: queue.into(),
            ..Self::default()
        }
    }
}

/// Resolve the requested index against the creation-time default.
/// Zero, negative and omitted indices all collapse to the first position.
pub fn resolve_step_index(requested: Option<i32>) -> i32 {
    match requested {
        Some(index) if index >= 1 => index,
        _ => DEFAULT_STEP_INDEX,
    }
}

/// Sibling summary used by the sequencing gates
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSibling {
    pub id: i64,
    pub block_uuid: Uuid,
    pub step_index: i32,
    pub step_type: StepType,
    pub state: StepState,
    pub child_block_uuid: Option<Uuid>,
}

impl FromRow<'_, PgRow> for BlockSibling {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let step_type: String = row.try_get("step_type")?;

        Ok(Self {
            id: row.try_get("id")?,
            block_uuid: row.try_get("block_uuid")?,
            step_index: row.try_get("step_index")?,
            step_type: step_type
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            state: state
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            child_block_uuid: row.try_get("child_block_uuid")?,
        })
    }
}

/// Decide whether the previous index of a block has concluded, from the
/// block's sibling summaries.
///
/// Index 1 (and any index with no gate-type predecessors) qualifies
/// immediately. While a pending `resolve-exception` step exists in the
/// block, the gate depends on the recovery steps at the previous index
/// instead of the default-type ones: the recovery sub-path runs first, and
/// only once its steps have concluded does the gate fall back to the
/// default predecessors (which the recovery work unit is expected to have
/// repaired).
pub fn previous_index_gate(siblings: &[BlockSibling], step_id: i64, step_index: i32) -> bool {
    if step_index <= DEFAULT_STEP_INDEX {
        return true;
    }

    let resolution_pending = siblings.iter().any(|s| {
        s.id != step_id && s.step_type == StepType::ResolveException && s.state == StepState::Pending
    });
    let gate_type = if resolution_pending {
        StepType::ResolveException
    } else {
        StepType::Default
    };

    let mut predecessors = siblings
        .iter()
        .filter(|s| s.step_type == gate_type && s.step_index == step_index - 1)
        .peekable();

    if predecessors.peek().is_none() {
        // No recovery predecessors while recovery is pending means the
        // sub-flow has not produced its steps yet; hold the gate closed.
        return !resolution_pending;
    }

    predecessors.all(|s| s.state.is_concluded_success())
}

impl Step {
    /// Insert a fully resolved step row. Callers go through
    /// [`crate::orchestration::StepCreator`], which applies the
    /// creation-time defaults first.
    pub async fn insert(
        pool: &PgPool,
        new_step: &NewStep,
        block_uuid: Uuid,
        step_index: i32,
        group_name: &str,
    ) -> Result<Step, sqlx::Error> {
        let state = new_step.step_type.initial_state();
        let query = format!(
            r#"
            INSERT INTO stepflow_steps (
                block_uuid, child_block_uuid, step_index, step_type, class, arguments,
                queue, group_name, priority, state, dispatch_after, relatable_kind,
                relatable_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
            RETURNING {STEP_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(block_uuid)
            .bind(new_step.child_block_uuid)
            .bind(step_index)
            .bind(new_step.step_type.to_string())
            .bind(&new_step.class)
            .bind(&new_step.arguments)
            .bind(&new_step.queue)
            .bind(group_name)
            .bind(new_step.priority.unwrap_or(0))
            .bind(state.to_string())
            .bind(new_step.dispatch_after)
            .bind(new_step.relatable.as_ref().map(|r| r.kind.clone()))
            .bind(new_step.relatable.as_ref().map(|r| r.id))
            .fetch_one(pool)
            .await
    }

    /// Find a step by ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Step>, sqlx::Error> {
        let query = format!("SELECT {STEP_COLUMNS} FROM stepflow_steps WHERE id = $1");

        sqlx::query_as::<_, Step>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All steps of a block, ordered by index then ID
    pub async fn for_block(pool: &PgPool, block_uuid: Uuid) -> Result<Vec<Step>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM stepflow_steps \
             WHERE block_uuid = $1 ORDER BY step_index, id"
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(block_uuid)
            .fetch_all(pool)
            .await
    }

    /// All steps in a dispatch group
    pub async fn for_group(pool: &PgPool, group_name: &str) -> Result<Vec<Step>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM stepflow_steps \
             WHERE group_name = $1 ORDER BY id"
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(group_name)
            .fetch_all(pool)
            .await
    }

    /// Steps owned by one external domain object
    pub async fn for_relatable(
        pool: &PgPool,
        relatable: &RelatableRef,
    ) -> Result<Vec<Step>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM stepflow_steps \
             WHERE relatable_kind = $1 AND relatable_id = $2 ORDER BY id"
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(&relatable.kind)
            .bind(relatable.id)
            .fetch_all(pool)
            .await
    }

    /// Dormant recovery steps of a block that have been promoted but not
    /// yet claimed
    pub async fn pending_resolutions(
        pool: &PgPool,
        block_uuid: Uuid,
    ) -> Result<Vec<Step>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM stepflow_steps \
             WHERE block_uuid = $1 AND step_type = $2 AND state = $3 ORDER BY step_index, id"
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(block_uuid)
            .bind(StepType::ResolveException.to_string())
            .bind(StepState::Pending.to_string())
            .fetch_all(pool)
            .await
    }

    /// Group carried by this step's workflow tree, if any: first a parent
    /// pointing at the block, then any sibling already carrying one.
    pub async fn inherited_group(
        pool: &PgPool,
        block_uuid: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let parent_group: Option<String> = sqlx::query_scalar(
            "SELECT group_name FROM stepflow_steps \
             WHERE child_block_uuid = $1 ORDER BY id LIMIT 1",
        )
        .bind(block_uuid)
        .fetch_optional(pool)
        .await?;

        if parent_group.is_some() {
            return Ok(parent_group);
        }

        sqlx::query_scalar(
            "SELECT group_name FROM stepflow_steps \
             WHERE block_uuid = $1 ORDER BY id LIMIT 1",
        )
        .bind(block_uuid)
        .fetch_optional(pool)
        .await
    }

    /// SQL prefilter of the dispatch query: pending default-type steps of
    /// the claimed group whose throttle instant, if any, has passed.
    /// Sequencing gates are applied on top by the discovery layer.
    pub async fn dispatch_candidates(
        pool: &PgPool,
        group_name: Option<&str>,
    ) -> Result<Vec<Step>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM stepflow_steps \
             WHERE state = $1 AND step_type = $2 \
               AND group_name IS NOT DISTINCT FROM $3 \
               AND (dispatch_after IS NULL OR dispatch_after <= NOW()) \
             ORDER BY priority DESC, step_index ASC, id ASC"
        );

        sqlx::query_as::<_, Step>(&query)
            .bind(StepState::Pending.to_string())
            .bind(StepType::Default.to_string())
            .bind(group_name)
            .fetch_all(pool)
            .await
    }

    /// Sibling summaries for a set of blocks, for evaluating sequencing
    /// gates in one round trip
    pub async fn block_siblings(
        pool: &PgPool,
        block_uuids: &[Uuid],
    ) -> Result<Vec<BlockSibling>, sqlx::Error> {
        sqlx::query_as::<_, BlockSibling>(
            "SELECT id, block_uuid, step_index, step_type, state, child_block_uuid \
             FROM stepflow_steps WHERE block_uuid = ANY($1) ORDER BY step_index, id",
        )
        .bind(block_uuids)
        .fetch_all(pool)
        .await
    }

    /// Whether every gate-type step at the previous index of this step's
    /// block has concluded with success
    pub async fn previous_index_is_concluded(&self, pool: &PgPool) -> Result<bool, sqlx::Error> {
        let siblings = Self::block_siblings(pool, &[self.block_uuid]).await?;
        Ok(previous_index_gate(&siblings, self.id, self.step_index))
    }

    /// Whether every descendant in this step's child block tree has
    /// concluded with success.
    ///
    /// Walks the nesting with an explicit worklist so deep trees cannot
    /// exhaust the stack. A traversed block with zero spawned steps fails
    /// the check: absence means "not yet spawned".
    pub async fn child_steps_are_concluded(&self, pool: &PgPool) -> Result<bool, sqlx::Error> {
        let Some(root_block) = self.child_block_uuid else {
            return Ok(true);
        };

        let mut worklist = vec![root_block];
        let mut visited: HashSet<Uuid> = HashSet::new();

        while let Some(block_uuid) = worklist.pop() {
            if !visited.insert(block_uuid) {
                continue;
            }

            let children = Self::block_siblings(pool, &[block_uuid]).await?;
            if children.is_empty() {
                return Ok(false);
            }

            for child in children {
                if !child.state.is_concluded_success() {
                    return Ok(false);
                }
                if let Some(nested) = child.child_block_uuid {
                    worklist.push(nested);
                }
            }
        }

        Ok(true)
    }

    /// Push the step's next dispatch into the future and count the retry.
    /// The step stays `Pending`; the dispatch query simply ignores it until
    /// the instant passes.
    pub async fn throttle(
        &mut self,
        pool: &PgPool,
        delay: chrono::Duration,
    ) -> Result<(), sqlx::Error> {
        let dispatch_after = Utc::now() + delay;

        sqlx::query(
            "UPDATE stepflow_steps \
             SET dispatch_after = $2, retries = retries + 1, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(dispatch_after)
        .execute(pool)
        .await?;

        self.dispatch_after = Some(dispatch_after);
        self.retries += 1;
        Ok(())
    }

    /// Flag the step as having been surfaced to external alerting
    pub async fn mark_notified(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE stepflow_steps SET was_notified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(self.id)
        .execute(pool)
        .await?;

        self.was_notified = true;
        Ok(())
    }

    /// Record that the work unit timed out: sets `error_message` and, when
    /// the step is owned by a domain object, publishes an audit event.
    /// Deciding the state consequence is the runner's concern, not this
    /// method's. Telemetry failures are swallowed; a timeout report must
    /// never take the worker down.
    pub async fn record_execution_timeout(
        &mut self,
        pool: &PgPool,
        publisher: &EventPublisher,
        message: &str,
    ) {
        let result = sqlx::query(
            "UPDATE stepflow_steps SET error_message = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(self.id)
        .bind(message)
        .execute(pool)
        .await;

        match result {
            Ok(_) => {
                self.error_message = Some(message.to_string());
            }
            Err(error) => {
                tracing::warn!(
                    step_id = self.id,
                    error = %error,
                    "Failed to record execution timeout"
                );
                return;
            }
        }

        if self.relatable_kind.is_some() {
            let context = serde_json::json!({
                "step_id": self.id,
                "class": self.class,
                "relatable_kind": self.relatable_kind,
                "relatable_id": self.relatable_id,
                "message": message,
            });
            if let Err(error) = publisher
                .publish(events::STEP_EXECUTION_TIMEOUT, context)
                .await
            {
                tracing::warn!(
                    step_id = self.id,
                    error = %error,
                    "Failed to publish execution timeout audit event"
                );
            }
        }
    }

    /// The relatable reference, when the step is owned by a domain object
    pub fn relatable(&self) -> Option<RelatableRef> {
        match (&self.relatable_kind, self.relatable_id) {
            (Some(kind), Some(id)) => Some(RelatableRef::new(kind.clone(), id)),
            _ => None,
        }
    }

    /// A step is a parent iff it carries a child block pointer
    pub fn is_parent(&self) -> bool {
        self.child_block_uuid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sibling(
        id: i64,
        step_index: i32,
        step_type: StepType,
        state: StepState,
    ) -> BlockSibling {
        BlockSibling {
            id,
            block_uuid: Uuid::nil(),
            step_index,
            step_type,
            state,
            child_block_uuid: None,
        }
    }

    #[test]
    fn test_resolve_step_index_defaults() {
        assert_eq!(resolve_step_index(None), 1);
        assert_eq!(resolve_step_index(Some(0)), 1);
        assert_eq!(resolve_step_index(Some(-3)), 1);
        assert_eq!(resolve_step_index(Some(1)), 1);
        assert_eq!(resolve_step_index(Some(7)), 7);
    }

    #[test]
    fn test_initial_state_by_type() {
        assert_eq!(StepType::Default.initial_state(), StepState::Pending);
        assert_eq!(
            StepType::ResolveException.initial_state(),
            StepState::NotRunnable
        );
    }

    #[test]
    fn test_step_type_string_conversion() {
        assert_eq!(StepType::ResolveException.to_string(), "resolve-exception");
        assert_eq!(
            "resolve-exception".parse::<StepType>().unwrap(),
            StepType::ResolveException
        );
        assert!("other".parse::<StepType>().is_err());
    }

    #[test]
    fn test_gate_index_one_always_qualifies() {
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Pending),
            sibling(2, 1, StepType::Default, StepState::Pending),
        ];
        assert!(previous_index_gate(&siblings, 1, 1));
        assert!(previous_index_gate(&siblings, 2, 1));
    }

    #[test]
    fn test_gate_blocks_until_predecessor_concludes() {
        // Scenario A: A(idx=1), B(idx=2); B waits on A.
        let mut siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Pending),
            sibling(2, 2, StepType::Default, StepState::Pending),
        ];
        assert!(!previous_index_gate(&siblings, 2, 2));

        siblings[0].state = StepState::Running;
        assert!(!previous_index_gate(&siblings, 2, 2));

        siblings[0].state = StepState::Completed;
        assert!(previous_index_gate(&siblings, 2, 2));
    }

    #[test]
    fn test_gate_skipped_counts_as_success() {
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Skipped),
            sibling(2, 2, StepType::Default, StepState::Pending),
        ];
        assert!(previous_index_gate(&siblings, 2, 2));
    }

    #[test]
    fn test_gate_failure_does_not_satisfy() {
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Failed),
            sibling(2, 2, StepType::Default, StepState::Pending),
        ];
        assert!(!previous_index_gate(&siblings, 2, 2));
    }

    #[test]
    fn test_gate_parallel_same_index() {
        // Two index-2 steps both become dispatchable once index 1 concludes.
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Completed),
            sibling(2, 2, StepType::Default, StepState::Pending),
            sibling(3, 2, StepType::Default, StepState::Pending),
        ];
        assert!(previous_index_gate(&siblings, 2, 2));
        assert!(previous_index_gate(&siblings, 3, 2));
    }

    #[test]
    fn test_gate_requires_all_predecessors() {
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Completed),
            sibling(2, 1, StepType::Default, StepState::Running),
            sibling(3, 2, StepType::Default, StepState::Pending),
        ];
        assert!(!previous_index_gate(&siblings, 3, 2));
    }

    #[test]
    fn test_gate_index_gap_passes() {
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Completed),
            sibling(2, 3, StepType::Default, StepState::Pending),
        ];
        // No default-type steps at index 2; the gap does not wedge the block.
        assert!(previous_index_gate(&siblings, 2, 3));
    }

    #[test]
    fn test_gate_resolution_override_reroutes_next_index() {
        // Index-1 failed, a recovery step at index 1 is pending: index 2 now
        // gates on the recovery step, not the failed default predecessor.
        let mut siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Failed),
            sibling(2, 1, StepType::ResolveException, StepState::Pending),
            sibling(3, 2, StepType::Default, StepState::Pending),
        ];
        assert!(!previous_index_gate(&siblings, 3, 2));

        // The recovery work unit re-marks the failed step, but while the
        // recovery step itself is still pending the sub-path keeps
        // precedence over the normal sequence.
        siblings[0].state = StepState::Skipped;
        assert!(!previous_index_gate(&siblings, 3, 2));

        // Recovery concluded: the gate falls back to the (now repaired)
        // default predecessors and opens.
        siblings[1].state = StepState::Completed;
        assert!(previous_index_gate(&siblings, 3, 2));
    }

    #[test]
    fn test_gate_dormant_resolution_does_not_override() {
        // NotRunnable recovery steps are invisible to the gate until promoted.
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Completed),
            sibling(2, 1, StepType::ResolveException, StepState::NotRunnable),
            sibling(3, 2, StepType::Default, StepState::Pending),
        ];
        assert!(previous_index_gate(&siblings, 3, 2));
    }

    #[test]
    fn test_gate_pending_resolution_without_predecessors_blocks() {
        // Recovery pending at index 2 while the gated step is also index 2:
        // there are no recovery steps at index 1, so the gate holds closed.
        let siblings = vec![
            sibling(1, 1, StepType::Default, StepState::Failed),
            sibling(2, 2, StepType::ResolveException, StepState::Pending),
            sibling(3, 2, StepType::Default, StepState::Pending),
        ];
        assert!(!previous_index_gate(&siblings, 3, 2));
    }

    #[test]
    fn test_relatable_accessor() {
        let mut step = sample_step();
        assert_eq!(step.relatable(), None);

        step.relatable_kind = Some("position".into());
        step.relatable_id = Some(9);
        assert_eq!(step.relatable(), Some(RelatableRef::new("position", 9)));
    }

    fn sample_step() -> Step {
        Step {
            id: 1,
            block_uuid: Uuid::nil(),
            child_block_uuid: None,
            step_index: 1,
            step_type: StepType::Default,
            class: "orders::PlaceOrder".into(),
            arguments: serde_json::json!({}),
            queue: "default".into(),
            group_name: "fast".into(),
            priority: 0,
            state: StepState::Pending,
            started_at: None,
            completed_at: None,
            duration: None,
            hostname: None,
            retries: 0,
            dispatch_after: None,
            error_message: None,
            error_stack_trace: None,
            was_notified: false,
            relatable_kind: None,
            relatable_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
