//! # StepsDispatcherTick Model
//!
//! One accounting row per claim-to-release cycle of a group's dispatch
//! lock: opened when the lock is acquired, closed with duration and
//! progress when it is released, immutable afterwards. The tick history is
//! the audit trail for dispatch-cycle health and anchors the long-tick
//! backpressure alert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StepsDispatcherTick {
    pub id: i64,
    pub group_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
    pub progress: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const TICK_COLUMNS: &str =
    "id, group_name, started_at, completed_at, duration, progress, created_at, updated_at";

impl StepsDispatcherTick {
    /// Open a tick for a claimed group. `started_at` is the cycle's start
    /// marker; duration is computed against it at close.
    pub async fn open(
        pool: &PgPool,
        group_name: Option<&str>,
    ) -> Result<StepsDispatcherTick, sqlx::Error> {
        let query = format!(
            "INSERT INTO stepflow_steps_dispatcher_ticks (group_name, started_at) \
             VALUES ($1, NOW()) RETURNING {TICK_COLUMNS}"
        );

        sqlx::query_as::<_, StepsDispatcherTick>(&query)
            .bind(group_name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: i64,
    ) -> Result<Option<StepsDispatcherTick>, sqlx::Error> {
        let query =
            format!("SELECT {TICK_COLUMNS} FROM stepflow_steps_dispatcher_ticks WHERE id = $1");

        sqlx::query_as::<_, StepsDispatcherTick>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Close the tick with its accounting. Write-once: a completed tick is
    /// never touched again.
    pub async fn close(
        pool: &PgPool,
        id: i64,
        duration: f64,
        progress: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE stepflow_steps_dispatcher_ticks \
             SET completed_at = NOW(), duration = $2, progress = $3, updated_at = NOW() \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(duration)
        .bind(progress)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Most recent ticks for a group, newest first
    pub async fn recent_for_group(
        pool: &PgPool,
        group_name: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StepsDispatcherTick>, sqlx::Error> {
        let query = format!(
            "SELECT {TICK_COLUMNS} FROM stepflow_steps_dispatcher_ticks \
             WHERE group_name IS NOT DISTINCT FROM $1 \
             ORDER BY started_at DESC LIMIT $2"
        );

        sqlx::query_as::<_, StepsDispatcherTick>(&query)
            .bind(group_name)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mean completed-cycle duration for a group, for health monitoring
    pub async fn mean_duration(
        pool: &PgPool,
        group_name: Option<&str>,
    ) -> Result<Option<f64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT AVG(duration) FROM stepflow_steps_dispatcher_ticks \
             WHERE group_name IS NOT DISTINCT FROM $1 AND completed_at IS NOT NULL",
        )
        .bind(group_name)
        .fetch_one(pool)
        .await
    }
}
