//! Snapshot loader - one bulk read per relation instead of a round-trip per
//! candidate.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::time::timeout;

use crate::domains::scheduler::indexes::{DedupIndex, OverlapIndex};
use crate::domains::scheduler::models::template::{DaySet, RecurringKind, ScheduleKind};
use crate::domains::scheduler::models::{ClientId, CompanyId, EmployeeId, Template, TemplateId, TrackingRow};

const SENTINEL_END_DATE: &str = "0001-01-01";
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything expansion needs, loaded up front. Owned entirely by one run;
/// never shared or reused across runs.
pub struct Snapshot {
    pub weekly_templates: Vec<Template>,
    pub monthly_templates: Vec<Template>,
    pub dedup: DedupIndex,
    pub overlap: OverlapIndex,
    pub tracking: HashMap<TemplateId, TrackingRow>,
    pub last_instance_date: HashMap<TemplateId, NaiveDate>,
    pub last_historical_match: HashMap<TemplateId, NaiveDate>,
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    template_id: i64,
    recurring_kind: String,
    week_stride: i32,
    nth_weekday: Option<i16>,
    days: i16,
    start_date: NaiveDate,
    end_date: NaiveDate,
    last_run: Option<NaiveDate>,
    time_in: NaiveTime,
    time_out: NaiveTime,
    day_span: i32,
    client_id: i64,
    employee_id: i64,
    company_id: i64,
    group_id: Option<i64>,
    schedule_kind: i16,
    is_active: bool,
    is_reset: bool,
    extra: Option<serde_json::Value>,
}

impl TemplateRow {
    fn into_template(self, scan_area_ids: &HashSet<TemplateId>, claim_ids: &HashSet<TemplateId>) -> anyhow::Result<Template> {
        let recurring_kind = RecurringKind::from_db(&self.recurring_kind)
            .ok_or_else(|| anyhow::anyhow!("unknown recurring_kind {}", self.recurring_kind))?;
        let schedule_kind = ScheduleKind::from_db(self.schedule_kind)
            .ok_or_else(|| anyhow::anyhow!("unknown schedule_kind {}", self.schedule_kind))?;

        Ok(Template {
            template_id: self.template_id,
            recurring_kind,
            week_stride: self.week_stride,
            nth_weekday: self.nth_weekday,
            days: DaySet::from_bits(self.days),
            start_date: self.start_date,
            end_date: normalize_sentinel(self.end_date),
            last_run: self.last_run,
            time_in: self.time_in,
            time_out: self.time_out,
            day_span: self.day_span,
            client_id: self.client_id,
            employee_id: self.employee_id,
            company_id: self.company_id,
            group_id: self.group_id,
            schedule_kind,
            is_active: self.is_active,
            is_reset: self.is_reset,
            has_scan_areas: scan_area_ids.contains(&self.template_id),
            has_claims: claim_ids.contains(&self.template_id),
            extra: self.extra,
        })
    }
}

/// Sentinel dates (`0001-01-01`) are normalized to `None` here, at the
/// repository boundary - nothing downstream ever compares against the
/// sentinel.
fn normalize_sentinel(d: NaiveDate) -> Option<NaiveDate> {
    if d.format("%Y-%m-%d").to_string() == SENTINEL_END_DATE {
        None
    } else {
        Some(d)
    }
}

#[derive(Debug, FromRow)]
struct StdKeyRow {
    client_id: i64,
    employee_id: i64,
    start_minute: i64,
    end_minute: i64,
}

#[derive(Debug, FromRow)]
struct OpenKeyRow {
    template_id: i64,
    client_id: i64,
    employee_id: i64,
    start_minute: i64,
    end_minute: i64,
}

#[derive(Debug, FromRow)]
struct IntervalRow {
    employee_id: i64,
    start_ts: chrono::DateTime<Utc>,
    end_ts: chrono::DateTime<Utc>,
    client_id: i64,
    instance_id: uuid::Uuid,
    template_id: i64,
}

#[derive(Debug, FromRow)]
struct DateAggRow {
    template_id: i64,
    matched_date: NaiveDate,
}

pub async fn load_snapshot(
    pool: &PgPool,
    window_start: NaiveDate,
    window_end: NaiveDate,
    company_id: Option<CompanyId>,
    template_id: Option<TemplateId>,
) -> anyhow::Result<Snapshot> {
    let scan_area_ids = load_capability_set(pool, "template_scan_area").await?;
    let claim_ids = load_capability_set(pool, "template_claim").await?;

    let weekly_templates = load_templates(
        pool,
        RecurringKind::Weekly,
        company_id,
        template_id,
        &scan_area_ids,
        &claim_ids,
    )
    .await?;
    let monthly_templates = load_templates(
        pool,
        RecurringKind::Monthly,
        company_id,
        template_id,
        &scan_area_ids,
        &claim_ids,
    )
    .await?;

    let mut dedup = DedupIndex::new();
    for key in load_std_keys(pool, window_start, window_end).await? {
        dedup.insert_std(key);
    }
    for key in load_open_keys(pool, window_start, window_end).await? {
        dedup.insert_open(key);
    }

    let mut overlap = OverlapIndex::new();
    for iv in load_intervals(pool, window_start, window_end).await? {
        overlap.register(
            iv.employee_id,
            iv.start_ts,
            iv.end_ts,
            iv.client_id,
            iv.instance_id,
            iv.template_id,
        );
    }

    let tracking = load_tracking(pool).await?;

    let multi_week_ids: Vec<TemplateId> = weekly_templates
        .iter()
        .filter(|t| t.week_stride > 1)
        .map(|t| t.template_id)
        .collect();

    let last_instance_date = load_last_instance_dates(pool, &multi_week_ids).await?;
    let last_historical_match = load_last_historical_match(pool, &multi_week_ids).await?;

    Ok(Snapshot {
        weekly_templates,
        monthly_templates,
        dedup,
        overlap,
        tracking,
        last_instance_date,
        last_historical_match,
    })
}

async fn load_templates(
    pool: &PgPool,
    kind: RecurringKind,
    company_id: Option<CompanyId>,
    template_id: Option<TemplateId>,
    scan_area_ids: &HashSet<TemplateId>,
    claim_ids: &HashSet<TemplateId>,
) -> anyhow::Result<Vec<Template>> {
    let kind_str = match kind {
        RecurringKind::Weekly => "WEEKLY",
        RecurringKind::Monthly => "MONTHLY",
    };

    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT template_id, recurring_kind, week_stride, nth_weekday, days,
                   start_date, end_date, last_run, time_in, time_out, day_span,
                   client_id, employee_id, company_id, group_id, schedule_kind,
                   is_active, is_reset, extra
            FROM shift_template
            WHERE recurring_kind = $1
              AND ($2::BIGINT IS NULL OR company_id = $2)
              AND ($3::BIGINT IS NULL OR template_id = $3)
            "#,
        )
        .bind(kind_str)
        .bind(company_id)
        .bind(template_id)
        .fetch_all(pool),
    )
    .await??;

    rows.into_iter()
        .map(|r| r.into_template(scan_area_ids, claim_ids))
        .collect()
}

async fn load_capability_set(pool: &PgPool, table: &str) -> anyhow::Result<HashSet<TemplateId>> {
    // Table name comes from a fixed internal set (scan areas / claims), never
    // from caller input, so string interpolation here does not admit
    // injection from outside this module.
    let sql = format!("SELECT DISTINCT template_id FROM {table}");
    let ids: Vec<i64> = timeout(QUERY_TIMEOUT, sqlx::query_scalar(&sql).fetch_all(pool)).await??;
    Ok(ids.into_iter().collect())
}

async fn load_std_keys(
    pool: &PgPool,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> anyhow::Result<Vec<(ClientId, EmployeeId, i64, i64)>> {
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, StdKeyRow>(
            r#"
            SELECT client_id, employee_id,
                   EXTRACT(EPOCH FROM start_ts)::BIGINT / 60 AS start_minute,
                   EXTRACT(EPOCH FROM end_ts)::BIGINT / 60 AS end_minute
            FROM instance
            WHERE is_active AND start_ts::date BETWEEN $1 AND $2
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(pool),
    )
    .await??;

    Ok(rows
        .into_iter()
        .map(|r| (r.client_id, r.employee_id, r.start_minute, r.end_minute))
        .collect())
}

async fn load_open_keys(
    pool: &PgPool,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> anyhow::Result<Vec<(TemplateId, ClientId, EmployeeId, i64, i64)>> {
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, OpenKeyRow>(
            r#"
            SELECT template_id, client_id, employee_id,
                   EXTRACT(EPOCH FROM start_ts)::BIGINT / 60 AS start_minute,
                   EXTRACT(EPOCH FROM end_ts)::BIGINT / 60 AS end_minute
            FROM instance
            WHERE is_active AND start_ts::date BETWEEN $1 AND $2
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(pool),
    )
    .await??;

    Ok(rows
        .into_iter()
        .map(|r| (r.template_id, r.client_id, r.employee_id, r.start_minute, r.end_minute))
        .collect())
}

async fn load_intervals(
    pool: &PgPool,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> anyhow::Result<Vec<IntervalRow>> {
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, IntervalRow>(
            r#"
            SELECT employee_id, start_ts, end_ts, client_id, id AS instance_id, template_id
            FROM instance
            WHERE is_active AND employee_id != 0 AND start_ts::date BETWEEN $1 AND $2
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(pool),
    )
    .await??;

    Ok(rows)
}

async fn load_tracking(pool: &PgPool) -> anyhow::Result<HashMap<TemplateId, TrackingRow>> {
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, TrackingRow>(
            "SELECT template_id, next_date, changed_this_run, edit_mode FROM multi_week_tracking",
        )
        .fetch_all(pool),
    )
    .await??;

    Ok(rows.into_iter().map(|r| (r.template_id, r)).collect())
}

async fn load_last_instance_dates(
    pool: &PgPool,
    template_ids: &[TemplateId],
) -> anyhow::Result<HashMap<TemplateId, NaiveDate>> {
    if template_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, DateAggRow>(
            r#"
            SELECT template_id, MAX(start_ts::date) AS matched_date
            FROM instance
            WHERE template_id = ANY($1) AND is_active
            GROUP BY template_id
            "#,
        )
        .bind(template_ids)
        .fetch_all(pool),
    )
    .await??;

    Ok(rows.into_iter().map(|r| (r.template_id, r.matched_date)).collect())
}

async fn load_last_historical_match(
    pool: &PgPool,
    template_ids: &[TemplateId],
) -> anyhow::Result<HashMap<TemplateId, NaiveDate>> {
    if template_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = timeout(
        QUERY_TIMEOUT,
        sqlx::query_as::<_, DateAggRow>(
            r#"
            SELECT template_id, MAX(start_ts::date) AS matched_date
            FROM instance
            WHERE template_id = ANY($1) AND start_ts::date < CURRENT_DATE
            GROUP BY template_id
            "#,
        )
        .bind(template_ids)
        .fetch_all(pool),
    )
    .await??;

    Ok(rows.into_iter().map(|r| (r.template_id, r.matched_date)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_end_date_normalizes_to_none() {
        let sentinel = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        assert_eq!(normalize_sentinel(sentinel), None);
    }

    #[test]
    fn real_end_date_passes_through() {
        let d = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert_eq!(normalize_sentinel(d), Some(d));
    }
}
