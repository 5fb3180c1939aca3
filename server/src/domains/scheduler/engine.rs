//! Top-level orchestration: the full pipeline from session acquisition
//! through session release, plus a single-template lean path that skips
//! cleanup, audit, and finalization for an ad hoc targeted run.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domains::scheduler::error::EngineError;
use crate::domains::scheduler::expansion::{expand_monthly, expand_weekly, SubBatches};
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::{CompanyId, RunStatus, RunSummary, TemplateId};
use crate::domains::scheduler::repository::{self, Snapshot};
use crate::domains::scheduler::session::{BeginOutcome, InProcessGuard, SessionCoordinator};
use crate::kernel::retry::RetryConfig;
use crate::kernel::{schema, ServerKernel};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RunOptions {
    pub company_id: Option<CompanyId>,
    pub template_id: Option<TemplateId>,
    pub advance_days: Option<i64>,
    pub monthly_months_ahead: Option<i64>,
    #[serde(default)]
    pub reset: bool,
}

impl RunOptions {
    /// Normalizes the HTTP wire convention: `0` on a numeric field means the
    /// same as omitting it - "use config / no narrowing".
    pub fn normalize(mut self) -> Self {
        if self.company_id == Some(0) {
            self.company_id = None;
        }
        if self.template_id == Some(0) {
            self.template_id = None;
        }
        if self.advance_days == Some(0) {
            self.advance_days = None;
        }
        if self.monthly_months_ahead == Some(0) {
            self.monthly_months_ahead = None;
        }
        self
    }
}

pub struct SchedulerEngine {
    kernel: ServerKernel,
    session: SessionCoordinator,
    guard: InProcessGuard,
}

impl SchedulerEngine {
    pub fn new(kernel: ServerKernel, guard: InProcessGuard) -> Self {
        let session = SessionCoordinator::new(kernel.db_pool.clone());
        Self { kernel, session, guard }
    }

    pub fn guard(&self) -> &InProcessGuard {
        &self.guard
    }

    /// Runs the full materialization pipeline once, start to finish.
    pub async fn run(
        &self,
        base_ts: DateTime<Utc>,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        if !self.guard.try_acquire() {
            return Err(EngineError::Blocked);
        }
        let result = self.run_guarded(base_ts, opts, cancel).await;
        self.guard.release();
        result
    }

    async fn run_guarded(
        &self,
        base_ts: DateTime<Utc>,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        let run_id = Uuid::new_v4();
        let today = base_ts.date_naive();
        let mut summary = RunSummary::builder().run_id(run_id).started_at(base_ts).build();

        schema::ensure(&self.kernel.db_pool).await?;

        match self.session.begin(run_id, "scheduler_engine").await? {
            BeginOutcome::Acquired => {}
            BeginOutcome::Blocked => return Err(EngineError::Blocked),
        }

        if let Err(err) = insert_run_summary(&self.kernel.db_pool, &summary).await {
            warn!(%err, "failed to record run start");
        }

        let outcome = self.execute(run_id, today, &opts, &cancel, &mut summary).await;

        let ended_at = Utc::now();
        if let Err(err) = self.session.complete(run_id, ended_at).await {
            warn!(%err, "failed to release session token cleanly");
        }

        let result = match outcome {
            Ok(()) => {
                summary.finish(RunStatus::Completed, None);
                Ok(summary)
            }
            Err(EngineError::Cancelled) => {
                summary.finish(RunStatus::Cancelled, None);
                Ok(summary)
            }
            Err(err) => {
                summary.finish(RunStatus::Failed, Some(err.to_string()));
                error!(%err, run_id = %run_id, "run failed");
                Err(err)
            }
        };

        let final_summary = match &result {
            Ok(s) => Some(s),
            Err(_) => None,
        };
        if let Some(s) = final_summary {
            if let Err(err) = update_run_summary(&self.kernel.db_pool, s).await {
                warn!(%err, "failed to record run completion");
            }
        }

        result
    }

    async fn execute(
        &self,
        run_id: Uuid,
        today: chrono::NaiveDate,
        opts: &RunOptions,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let config = &self.kernel.config;
        let advance_days = opts.advance_days.unwrap_or(config.advance_days);
        let monthly_months_ahead = opts.monthly_months_ahead.unwrap_or(config.monthly_months_ahead);

        if opts.reset {
            match opts.template_id {
                Some(template_id) => {
                    if let Err(err) = mark_template_reset(&self.kernel.db_pool, template_id).await {
                        warn!(%err, template_id, "failed to mark template for reset");
                    }
                }
                None => warn!("reset requested without a template_id narrowing; ignoring to avoid a mass reset"),
            }
        }

        if let Err(err) = repository::run_cleanup(&self.kernel.db_pool, config, today).await {
            warn!(%err, "cleanup stage failed, continuing with best-effort state");
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let window_end = today + chrono::Duration::days(advance_days.max(monthly_months_ahead * 31));
        let mut snapshot: Snapshot = repository::snapshot::load_snapshot(
            &self.kernel.db_pool,
            today,
            window_end,
            opts.company_id,
            opts.template_id,
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let weekly_out = expand_weekly(&mut snapshot, today, advance_days, run_id);
        apply_counts(summary, &weekly_out.audit_rows);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let monthly_out = expand_monthly(&mut snapshot, today, monthly_months_ahead, run_id);
        apply_counts(summary, &monthly_out.audit_rows);

        let retry_cfg = RetryConfig {
            max_attempts: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
        };

        persist(
            &self.kernel.db_pool,
            weekly_out.sub_batches,
            RecurrenceKindTag::Weekly,
            config.insert_batch_size as usize,
            config.sleep_between_batches_ms,
            &retry_cfg,
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        persist(
            &self.kernel.db_pool,
            monthly_out.sub_batches,
            RecurrenceKindTag::Monthly,
            config.insert_batch_size as usize,
            config.sleep_between_batches_ms,
            &retry_cfg,
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut audit_rows = weekly_out.audit_rows;
        audit_rows.extend(monthly_out.audit_rows);
        let mut conflict_rows = weekly_out.conflict_rows;
        conflict_rows.extend(monthly_out.conflict_rows);

        let finalize_input = repository::finalize::FinalizeInput {
            weekly_templates: &snapshot.weekly_templates,
            monthly_templates: &snapshot.monthly_templates,
            multi_week_advanced: &weekly_out.multi_week_advanced,
            audit_rows: &audit_rows,
            conflict_rows: &conflict_rows,
            audit_retention_days: config.audit_retention_days,
        };
        repository::finalize_run(&self.kernel.db_pool, today, finalize_input)
            .await
            .map_err(EngineError::Unrecoverable)?;

        info!(
            run_id = %run_id,
            created = summary.created_count,
            duplicate = summary.duplicate_count,
            overlap = summary.overlap_count,
            errors = summary.error_count,
            "run evaluated all candidates"
        );

        Ok(())
    }

    /// Single-template lean path: bypasses cleanup, audit, overlap
    /// detection, and the concurrency guard.
    pub async fn run_single_template(
        &self,
        template_id: TemplateId,
        base_ts: DateTime<Utc>,
        delete_future_unlinked: bool,
    ) -> Result<usize, EngineError> {
        let today = base_ts.date_naive();

        if delete_future_unlinked {
            if let Err(err) = delete_future_for_template(&self.kernel.db_pool, template_id, today).await {
                warn!(%err, template_id, "lean path: failed to clear future unlinked instances");
            }
        }

        let window_end = today + chrono::Duration::days(self.kernel.config.advance_days);
        let mut snapshot = repository::snapshot::load_snapshot(
            &self.kernel.db_pool,
            today,
            window_end,
            None,
            Some(template_id),
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        if snapshot.weekly_templates.is_empty() && snapshot.monthly_templates.is_empty() {
            return Err(EngineError::Validation(format!(
                "template {template_id} not found or not eligible to run"
            )));
        }

        let run_id = Uuid::new_v4();
        let weekly_out = expand_weekly(&mut snapshot, today, self.kernel.config.advance_days, run_id);
        let monthly_out = expand_monthly(&mut snapshot, today, self.kernel.config.monthly_months_ahead, run_id);

        let retry_cfg = RetryConfig {
            max_attempts: self.kernel.config.max_retries,
            base_delay_ms: self.kernel.config.retry_base_delay_ms,
        };

        let inserted_weekly = persist(
            &self.kernel.db_pool,
            weekly_out.sub_batches,
            RecurrenceKindTag::Weekly,
            self.kernel.config.insert_batch_size as usize,
            self.kernel.config.sleep_between_batches_ms,
            &retry_cfg,
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        let inserted_monthly = persist(
            &self.kernel.db_pool,
            monthly_out.sub_batches,
            RecurrenceKindTag::Monthly,
            self.kernel.config.insert_batch_size as usize,
            self.kernel.config.sleep_between_batches_ms,
            &retry_cfg,
        )
        .await
        .map_err(EngineError::Unrecoverable)?;

        sqlx::query("UPDATE shift_template SET last_run = $2 WHERE template_id = $1")
            .bind(template_id)
            .bind(today)
            .execute(&self.kernel.db_pool)
            .await?;

        Ok(inserted_weekly + inserted_monthly)
    }
}

async fn insert_run_summary(pool: &sqlx::PgPool, summary: &RunSummary) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO run_summary (run_id, started_at, status, created_count, duplicate_count, overlap_count, error_count)
        VALUES ($1, $2, $3, 0, 0, 0, 0)
        "#,
    )
    .bind(summary.run_id)
    .bind(summary.started_at)
    .bind(summary.status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

async fn update_run_summary(pool: &sqlx::PgPool, summary: &RunSummary) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE run_summary
        SET completed_at = $2, duration_s = $3, status = $4, created_count = $5,
            duplicate_count = $6, overlap_count = $7, error_count = $8, error = $9
        WHERE run_id = $1
        "#,
    )
    .bind(summary.run_id)
    .bind(summary.completed_at)
    .bind(summary.duration_s)
    .bind(summary.status.as_str())
    .bind(summary.created_count)
    .bind(summary.duplicate_count)
    .bind(summary.overlap_count)
    .bind(summary.error_count)
    .bind(&summary.error)
    .execute(pool)
    .await?;
    Ok(())
}

async fn persist(
    pool: &sqlx::PgPool,
    sub_batches: SubBatches,
    kind: RecurrenceKindTag,
    batch_size: usize,
    sleep_ms: u64,
    retry_cfg: &RetryConfig,
) -> anyhow::Result<usize> {
    repository::write::persist_sub_batches(pool, sub_batches, kind, batch_size, sleep_ms, retry_cfg).await
}

async fn mark_template_reset(pool: &sqlx::PgPool, template_id: TemplateId) -> anyhow::Result<()> {
    sqlx::query("UPDATE shift_template SET is_reset = TRUE WHERE template_id = $1")
        .bind(template_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn delete_future_for_template(pool: &sqlx::PgPool, template_id: TemplateId, today: chrono::NaiveDate) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE instance SET is_active = FALSE, updated_at = NOW()
        WHERE template_id = $1
          AND start_ts::date >= $2
          AND (external_timecard_ref IS NULL OR external_timecard_ref = '')
          AND NOT EXISTS (SELECT 1 FROM instance_claim c WHERE c.instance_id = instance.id)
        "#,
    )
    .bind(template_id)
    .bind(today + chrono::Duration::days(1))
    .execute(pool)
    .await?;
    Ok(())
}

fn apply_counts(summary: &mut RunSummary, audit_rows: &[crate::domains::scheduler::models::AuditRow]) {
    use crate::domains::scheduler::models::audit::AuditOutcome;
    for row in audit_rows {
        match row.outcome {
            AuditOutcome::Created => summary.created_count += 1,
            AuditOutcome::Duplicate => summary.duplicate_count += 1,
            AuditOutcome::Overlap => summary.overlap_count += 1,
            AuditOutcome::Error => summary.error_count += 1,
        }
    }
}
