//! # StepsDispatcher Model
//!
//! One advisory lock row per dispatch group (the NULL group is the global
//! one). `can_dispatch` is the mutex: it is only ever flipped through
//! conditional UPDATEs whose predicates re-check the flag at write time, so
//! acquisition is race-free without any dedicated lock service. Failure to
//! acquire is zero affected rows, not an error.
//!
//! `updated_at` doubles as the fairness queue: the group that has waited
//! longest since its last touch is offered first, bounding starvation by
//! the number of groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Advisory lock row for one dispatch group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StepsDispatcher {
    pub id: i64,
    pub group_name: Option<String>,
    pub can_dispatch: bool,
    pub current_tick_id: Option<i64>,
    pub last_tick_completed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DISPATCHER_COLUMNS: &str =
    "id, group_name, can_dispatch, current_tick_id, last_tick_completed, created_at, updated_at";

impl StepsDispatcher {
    /// Find the lock row for a group, creating it when absent. A create
    /// race between two workers is tolerated: the insert backs off on
    /// conflict and the row is re-fetched.
    pub async fn find_or_create(
        pool: &PgPool,
        group_name: Option<&str>,
    ) -> Result<StepsDispatcher, sqlx::Error> {
        sqlx::query(
            "INSERT INTO stepflow_steps_dispatchers (group_name) VALUES ($1) \
             ON CONFLICT DO NOTHING",
        )
        .bind(group_name)
        .execute(pool)
        .await?;

        let query = format!(
            "SELECT {DISPATCHER_COLUMNS} FROM stepflow_steps_dispatchers \
             WHERE group_name IS NOT DISTINCT FROM $1"
        );

        sqlx::query_as::<_, StepsDispatcher>(&query)
            .bind(group_name)
            .fetch_one(pool)
            .await
    }

    /// Lock row for a group, if one exists
    pub async fn find_by_group(
        pool: &PgPool,
        group_name: Option<&str>,
    ) -> Result<Option<StepsDispatcher>, sqlx::Error> {
        let query = format!(
            "SELECT {DISPATCHER_COLUMNS} FROM stepflow_steps_dispatchers \
             WHERE group_name IS NOT DISTINCT FROM $1"
        );

        sqlx::query_as::<_, StepsDispatcher>(&query)
            .bind(group_name)
            .fetch_optional(pool)
            .await
    }

    /// The unclaimed group that has waited longest, ties broken by ID
    pub async fn next_dispatchable(
        pool: &PgPool,
    ) -> Result<Option<StepsDispatcher>, sqlx::Error> {
        let query = format!(
            "SELECT {DISPATCHER_COLUMNS} FROM stepflow_steps_dispatchers \
             WHERE can_dispatch = TRUE ORDER BY updated_at ASC, id ASC LIMIT 1"
        );

        sqlx::query_as::<_, StepsDispatcher>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Force-release a lock that has been held unchanged for longer than
    /// `timeout_seconds`. The predicate re-checks both the flag and the
    /// age, so a freshly claimed lock is never stolen. Returns whether the
    /// failsafe fired.
    pub async fn release_if_stale(
        pool: &PgPool,
        id: i64,
        timeout_seconds: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stepflow_steps_dispatchers \
             SET can_dispatch = TRUE, updated_at = NOW() \
             WHERE id = $1 AND can_dispatch = FALSE \
               AND updated_at < NOW() - make_interval(secs => $2)",
        )
        .bind(id)
        .bind(timeout_seconds)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim the lock. The conditional UPDATE is the mutex acquisition:
    /// exactly one concurrent caller sees one affected row.
    pub async fn try_claim(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE stepflow_steps_dispatchers \
             SET can_dispatch = FALSE, updated_at = NOW() \
             WHERE id = $1 AND can_dispatch = TRUE",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Link the freshly opened tick to the claimed lock row
    pub async fn link_tick(pool: &PgPool, id: i64, tick_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE stepflow_steps_dispatchers SET current_tick_id = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(tick_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Release the lock at the end of a cycle
    pub async fn release(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE stepflow_steps_dispatchers \
             SET can_dispatch = TRUE, current_tick_id = NULL, \
                 last_tick_completed = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
