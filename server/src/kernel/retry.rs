//! Retry handler for transient storage faults.
//!
//! Wraps any unit of work that talks to Postgres. Retryable signals:
//! deadlock detected (`40P01`), serialization failure (`40001`), lock-wait
//! timeout, pool timeout, and connection-reset/gone-away I/O errors.
//! Everything else propagates immediately - it is not retryable by
//! definition (e.g. a unique-violation from bad input data).

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Configuration for the retry handler. Field names mirror the
/// `max_retries` / `retry_base_delay_ms` config options the engine exposes.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
        }
    }
}

/// Returns true if a `sqlx::Error` represents a transient condition worth
/// retrying with a fresh connection.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            matches!(
                db_err.code().as_deref(),
                Some("40P01") // deadlock_detected
                    | Some("40001") // serialization_failure
                    | Some("55P03") // lock_not_available
                    | Some("57014") // query_canceled (statement timeout)
            )
        }
        _ => false,
    }
}

/// Run `op` with exponential backoff + jitter, retrying only on
/// [`is_retryable`] errors. `op` is re-invoked with a fresh attempt each
/// time, so it must acquire its own connection from the pool rather than
/// reuse a borrowed one - that's what lets a retry get a fresh connection
/// instead of retrying against the same wedged one.
pub async fn with_retry<T, F, Fut>(cfg: &RetryConfig, mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < cfg.max_attempts && is_retryable(&err) => {
                let delay = backoff_delay(cfg.base_delay_ms, attempt);
                warn!(
                    attempt,
                    max_attempts = cfg.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying transient storage error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `base * 2^(attempt-1)` with +/-25% jitter, floored at 50ms.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    let jittered = (exp as f64) * (1.0 + jitter_frac);
    Duration::from_millis((jittered.max(50.0)) as u64)
}
