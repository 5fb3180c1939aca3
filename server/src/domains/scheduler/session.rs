//! Session coordinator - exactly-one-active-run semantics across every
//! process sharing the database, plus the in-process HTTP guard that
//! short-circuits before even touching the database.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// In-process guard for the HTTP surface. An optimization over the database
/// lock, not a replacement for it.
#[derive(Clone, Default)]
pub struct InProcessGuard {
    running: Arc<AtomicBool>,
}

impl InProcessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the guard was free and is now held.
    pub fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct SessionCoordinator {
    pool: PgPool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BeginOutcome {
    Acquired,
    Blocked,
}

/// Coarse soft-lock recovery window: a session older than this is assumed
/// abandoned by a crashed process.
const SESSION_LEASE: Duration = Duration::minutes(30);

impl SessionCoordinator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically claims the session token. Uses the same
    /// compare-and-swap-via-`WHERE` idiom as a `FOR UPDATE SKIP LOCKED`
    /// lease-expiry recovery query: the row is claimed only if it doesn't
    /// exist yet or its lease has expired.
    pub async fn begin(&self, run_id: Uuid, job_name: &str) -> Result<BeginOutcome, sqlx::Error> {
        let started_at = Utc::now();
        let expires_at = started_at + SESSION_LEASE;

        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_session (id, run_id, job_name, started_at, expires_at)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET run_id = EXCLUDED.run_id,
                job_name = EXCLUDED.job_name,
                started_at = EXCLUDED.started_at,
                expires_at = EXCLUDED.expires_at
            WHERE scheduler_session.expires_at < NOW()
            "#,
        )
        .bind(run_id)
        .bind(job_name)
        .bind(started_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(BeginOutcome::Acquired)
        } else {
            Ok(BeginOutcome::Blocked)
        }
    }

    pub async fn complete(&self, run_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scheduler_session SET expires_at = $2 WHERE id = 1 AND run_id = $1",
        )
        .bind(run_id)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
