//! Schema assurance.
//!
//! Creates engine-owned tables if absent. Idempotent, safe to call at the
//! top of every run. The same DDL also ships as `migrations/0001_scheduler_engine.sql`
//! for operators who prefer `sqlx migrate run`; this is the runtime fallback
//! for a bare database.

use sqlx::PgPool;

pub async fn ensure(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_session (
            id          INT PRIMARY KEY DEFAULT 1,
            run_id      UUID NOT NULL,
            job_name    TEXT NOT NULL,
            started_at  TIMESTAMPTZ NOT NULL,
            expires_at  TIMESTAMPTZ NOT NULL,
            CHECK (id = 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_summary (
            run_id          UUID PRIMARY KEY,
            started_at      TIMESTAMPTZ NOT NULL,
            completed_at    TIMESTAMPTZ,
            duration_s      DOUBLE PRECISION,
            status          TEXT NOT NULL,
            created_count   BIGINT NOT NULL DEFAULT 0,
            duplicate_count BIGINT NOT NULL DEFAULT 0,
            overlap_count   BIGINT NOT NULL DEFAULT 0,
            error_count     BIGINT NOT NULL DEFAULT 0,
            error           TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id          BIGSERIAL PRIMARY KEY,
            run_id      UUID NOT NULL,
            run_date    DATE NOT NULL,
            template_id BIGINT NOT NULL,
            instance_id UUID,
            employee_id BIGINT NOT NULL,
            client_id   BIGINT NOT NULL,
            start_ts    TIMESTAMPTZ NOT NULL,
            end_ts      TIMESTAMPTZ NOT NULL,
            outcome     TEXT NOT NULL,
            error_desc  TEXT,
            kind        TEXT NOT NULL,
            pattern     TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_run_id_idx ON audit_log (run_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_created_at_idx ON audit_log (created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_outcome_idx ON audit_log (outcome)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS audit_log_employee_start_idx ON audit_log (employee_id, start_ts)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conflict_log (
            id                  BIGSERIAL PRIMARY KEY,
            run_id              UUID NOT NULL,
            template_id         BIGINT NOT NULL,
            employee_id         BIGINT NOT NULL,
            blocked_client_id   BIGINT NOT NULL,
            blocked_start_ts    TIMESTAMPTZ NOT NULL,
            blocked_end_ts      TIMESTAMPTZ NOT NULL,
            existing_instance_id UUID NOT NULL,
            existing_client_id  BIGINT NOT NULL,
            existing_start_ts   TIMESTAMPTZ NOT NULL,
            existing_end_ts     TIMESTAMPTZ NOT NULL,
            detected_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS conflict_log_run_id_idx ON conflict_log (run_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS conflict_log_employee_id_idx ON conflict_log (employee_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS conflict_log_detected_at_idx ON conflict_log (detected_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS multi_week_tracking (
            template_id      BIGINT PRIMARY KEY,
            next_date        DATE NOT NULL,
            changed_this_run BOOLEAN NOT NULL DEFAULT FALSE,
            edit_mode        BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
