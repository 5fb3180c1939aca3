//! Finalization stage - advances `last_run` for every loaded template
//! (whether or not it emitted an instance this run - that's load-bearing,
//! it's what keeps an already-materialized window from being re-evaluated),
//! updates multi-week tracking, and flushes buffered audit/conflict rows in
//! batches of 1000, then prunes rows older than the configured retention
//! window.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;

use crate::domains::scheduler::expansion::recurrence::first_day_of_next_month;
use crate::domains::scheduler::models::{AuditRow, ConflictRow, Template, TemplateId};

const FLUSH_BATCH_SIZE: usize = 1000;

pub struct FinalizeInput<'a> {
    pub weekly_templates: &'a [Template],
    pub monthly_templates: &'a [Template],
    /// template_id -> last date an instance was committed this run, for
    /// multi-week tracking advance.
    pub multi_week_advanced: &'a std::collections::HashMap<TemplateId, NaiveDate>,
    pub audit_rows: &'a [AuditRow],
    pub conflict_rows: &'a [ConflictRow],
    pub audit_retention_days: i64,
}

pub async fn finalize_run(pool: &PgPool, today: NaiveDate, input: FinalizeInput<'_>) -> anyhow::Result<()> {
    advance_weekly_last_run(pool, input.weekly_templates, today).await?;
    advance_monthly_last_run(pool, input.monthly_templates, today).await?;
    update_multi_week_tracking(pool, input.multi_week_advanced).await?;
    flush_audit_rows(pool, input.audit_rows).await?;
    flush_conflict_rows(pool, input.conflict_rows).await?;
    prune_retention(pool, input.audit_retention_days).await?;
    Ok(())
}

async fn advance_weekly_last_run(pool: &PgPool, templates: &[Template], today: NaiveDate) -> anyhow::Result<()> {
    let ids: Vec<TemplateId> = templates.iter().map(|t| t.template_id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query("UPDATE shift_template SET last_run = $2 WHERE template_id = ANY($1)")
        .bind(&ids)
        .bind(today)
        .execute(pool)
        .await?;
    Ok(())
}

/// Monthly templates are grouped by the month they were loaded for (the
/// engine evaluates one month offset at a time); `last_run` becomes the
/// first day of the month *after* the one just evaluated.
async fn advance_monthly_last_run(pool: &PgPool, templates: &[Template], evaluated_month_start: NaiveDate) -> anyhow::Result<()> {
    let ids: Vec<TemplateId> = templates.iter().map(|t| t.template_id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let next_month_start = first_day_of_next_month(evaluated_month_start);
    sqlx::query("UPDATE shift_template SET last_run = $2 WHERE template_id = ANY($1)")
        .bind(&ids)
        .bind(next_month_start)
        .execute(pool)
        .await?;
    Ok(())
}

async fn update_multi_week_tracking(
    pool: &PgPool,
    advanced: &std::collections::HashMap<TemplateId, NaiveDate>,
) -> anyhow::Result<()> {
    for (template_id, last_instance_date) in advanced {
        sqlx::query(
            r#"
            UPDATE multi_week_tracking
            SET next_date = $2, changed_this_run = FALSE, edit_mode = FALSE
            WHERE template_id = $1
            "#,
        )
        .bind(template_id)
        .bind(last_instance_date)
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn flush_audit_rows(pool: &PgPool, rows: &[AuditRow]) -> anyhow::Result<()> {
    for chunk in rows.chunks(FLUSH_BATCH_SIZE) {
        let mut tx = pool.begin().await?;
        for row in chunk {
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (run_id, run_date, template_id, instance_id, employee_id, client_id,
                     start_ts, end_ts, outcome, error_desc, kind, pattern)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(row.run_id)
            .bind(row.run_date)
            .bind(row.template_id)
            .bind(row.instance_id)
            .bind(row.employee_id)
            .bind(row.client_id)
            .bind(row.start_ts)
            .bind(row.end_ts)
            .bind(row.outcome.as_str())
            .bind(&row.error_desc)
            .bind(row.kind.as_str())
            .bind(&row.pattern)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
    }
    Ok(())
}

async fn flush_conflict_rows(pool: &PgPool, rows: &[ConflictRow]) -> anyhow::Result<()> {
    for chunk in rows.chunks(FLUSH_BATCH_SIZE) {
        let mut tx = pool.begin().await?;
        for row in chunk {
            sqlx::query(
                r#"
                INSERT INTO conflict_log
                    (run_id, template_id, employee_id, blocked_client_id, blocked_start_ts,
                     blocked_end_ts, existing_instance_id, existing_client_id,
                     existing_start_ts, existing_end_ts)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(row.run_id)
            .bind(row.template_id)
            .bind(row.employee_id)
            .bind(row.blocked_client_id)
            .bind(row.blocked_start_ts)
            .bind(row.blocked_end_ts)
            .bind(row.existing_instance_id)
            .bind(row.existing_client_id)
            .bind(row.existing_start_ts)
            .bind(row.existing_end_ts)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
    }
    Ok(())
}

async fn prune_retention(pool: &PgPool, audit_retention_days: i64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - Duration::days(audit_retention_days);
    sqlx::query("DELETE FROM run_summary WHERE started_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM conflict_log WHERE detected_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(())
}
