//! Cleanup stage - retracts instances no longer justified by their template.
//! Failure here must never abort the rest of the run; every public function
//! here returns `anyhow::Result` but the engine only logs a failure from
//! this module, it never propagates it.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::kernel::retry::{with_retry, RetryConfig};

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub eligible_count: usize,
    pub deleted_count: usize,
    pub reset_templates: usize,
}

/// Phase A: compute the eligible-for-retraction id set, all in one read.
/// Eligible means: in the lookahead window, not linked to an external
/// timecard, not already claimed, and either orphaned, reset, or inactive.
async fn eligible_ids(pool: &PgPool, today: NaiveDate) -> anyhow::Result<Vec<uuid::Uuid>> {
    let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
        r#"
        SELECT i.id
        FROM instance i
        LEFT JOIN shift_template t ON t.template_id = i.template_id
        WHERE i.start_ts::date >= $1
          AND (i.external_timecard_ref IS NULL OR i.external_timecard_ref = '')
          AND NOT EXISTS (SELECT 1 FROM instance_claim c WHERE c.instance_id = i.id)
          AND (t.template_id IS NULL OR t.is_reset OR NOT t.is_active)
        "#,
    )
    .bind(today + Duration::days(1))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Phase B: batched delete-by-id, each batch its own transaction, with a
/// fixed inter-batch sleep to yield locks.
async fn delete_in_batches(
    pool: &PgPool,
    ids: &[uuid::Uuid],
    batch_size: usize,
    sleep_ms: u64,
    retry_cfg: &RetryConfig,
) -> anyhow::Result<usize> {
    let mut deleted = 0usize;
    for chunk in ids.chunks(batch_size.max(1)) {
        let chunk = chunk.to_vec();
        with_retry(retry_cfg, || {
            let pool = pool.clone();
            let chunk = chunk.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query("UPDATE instance SET is_active = FALSE, updated_at = NOW() WHERE id = ANY($1)")
                    .bind(&chunk)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await
            }
        })
        .await?;
        deleted += chunk.len();

        if sleep_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
        }
    }
    Ok(deleted)
}

/// Phase C: every template carrying `is_reset` gets its flag cleared and
/// `last_run` rewound so the next expansion regenerates it from today.
/// Multi-week templates (`week_stride > 1`) additionally get their tracking
/// anchor rewound to the last confirmed historical date, in edit mode,
/// since their walk depends on that anchor rather than only on `last_run`.
async fn apply_multi_week_resets(pool: &PgPool, today: NaiveDate) -> anyhow::Result<usize> {
    let reset_templates: Vec<(i64, i32)> = sqlx::query_as(
        "SELECT template_id, week_stride FROM shift_template WHERE is_reset",
    )
    .fetch_all(pool)
    .await?;

    for (template_id, week_stride) in &reset_templates {
        if *week_stride > 1 {
            let last_historical: Option<NaiveDate> = sqlx::query_scalar(
                "SELECT MAX(start_ts::date) FROM instance WHERE template_id = $1 AND start_ts::date < $2",
            )
            .bind(template_id)
            .bind(today)
            .fetch_one(pool)
            .await?;

            let next_date = last_historical.unwrap_or(today);

            sqlx::query(
                r#"
                INSERT INTO multi_week_tracking (template_id, next_date, changed_this_run, edit_mode)
                VALUES ($1, $2, FALSE, TRUE)
                ON CONFLICT (template_id) DO UPDATE
                SET next_date = EXCLUDED.next_date, edit_mode = TRUE
                "#,
            )
            .bind(template_id)
            .bind(next_date)
            .execute(pool)
            .await?;
        }

        sqlx::query(
            "UPDATE shift_template SET is_reset = FALSE, last_run = $2 WHERE template_id = $1",
        )
        .bind(template_id)
        .bind(today - Duration::days(1))
        .execute(pool)
        .await?;
    }

    Ok(reset_templates.len())
}

/// Phase D: truncate engine working tables and prune history older than
/// `history_retention_days`.
async fn prune_history(pool: &PgPool, retention_days: i64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - Duration::days(retention_days);
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

pub async fn run_cleanup(
    pool: &PgPool,
    config: &SchedulerConfig,
    today: NaiveDate,
) -> anyhow::Result<CleanupReport> {
    let retry_cfg = RetryConfig {
        max_attempts: config.max_retries,
        base_delay_ms: config.retry_base_delay_ms,
    };

    let ids = eligible_ids(pool, today).await?;
    info!(eligible = ids.len(), "cleanup: eligible instances for retraction");

    let deleted = delete_in_batches(
        pool,
        &ids,
        config.delete_batch_size as usize,
        config.sleep_between_batches_ms,
        &retry_cfg,
    )
    .await?;

    let reset_templates = apply_multi_week_resets(pool, today).await?;

    if let Err(err) = prune_history(pool, config.history_retention_days).await {
        warn!(%err, "cleanup: history pruning failed, continuing");
    }

    Ok(CleanupReport {
        eligible_count: ids.len(),
        deleted_count: deleted,
        reset_templates,
    })
}
