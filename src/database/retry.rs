//! # Deadlock-Safe Writes
//!
//! Contention-prone writes (the dispatcher claim and release, and anything
//! else that touches hot rows) go through a bounded retry loop that only
//! re-runs on the storage engine's deadlock signature, backing off with
//! randomized jitter so the colliding writers do not re-collide in
//! lockstep. Any other error is re-raised immediately; exhausting the
//! attempts re-raises the last deadlock.

use std::future::Future;
use std::time::Duration;

use crate::config::DeadlockRetryConfig;

/// PostgreSQL SQLSTATE codes that identify a retryable write collision
fn is_retryable_code(code: &str) -> bool {
    // 40P01 = deadlock_detected, 40001 = serialization_failure
    matches!(code, "40P01" | "40001")
}

/// Whether this error is the storage engine's deadlock signature
pub fn is_deadlock(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_retryable_code(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// Exponential backoff with multiplicative jitter, capped at the
/// configured maximum
fn backoff_delay(config: &DeadlockRetryConfig, attempt: u32) -> Duration {
    let base = Duration::from_millis(config.base_delay_ms)
        .mul_f64(2_f64.powi(attempt.saturating_sub(1) as i32));
    let jittered = base.mul_f64(1.0 + fastrand::f64() * config.jitter_factor);
    jittered.min(Duration::from_millis(config.max_delay_ms))
}

/// Run `operation`, retrying on deadlock up to the configured bound
pub async fn with_deadlock_retry<T, F, Fut>(
    config: &DeadlockRetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if is_deadlock(&error) && attempt < config.max_attempts => {
                attempt += 1;
                let delay = backoff_delay(config, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Deadlock detected, retrying write"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
