//! Persistence for accepted candidates. Bulk inserts use hand-written
//! multi-row `VALUES` - no query builder crate.

use sqlx::PgPool;

use crate::domains::scheduler::expansion::SubBatches;
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::{GroupId, Instance, TemplateId};
use crate::kernel::retry::{with_retry, RetryConfig};

const COLUMNS_PER_ROW: usize = 11;

pub async fn persist_sub_batches(
    pool: &PgPool,
    batches: SubBatches,
    kind: RecurrenceKindTag,
    batch_size: usize,
    sleep_ms: u64,
    retry_cfg: &RetryConfig,
) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    inserted += bulk_insert(pool, &batches.bulk_only, batch_size, sleep_ms, retry_cfg).await?;

    inserted += bulk_insert(pool, &batches.bulk_scan_areas, batch_size, sleep_ms, retry_cfg).await?;
    copy_scan_areas(pool, &batches.bulk_scan_areas).await?;

    inserted += bulk_insert(pool, &batches.bulk_claims, batch_size, sleep_ms, retry_cfg).await?;
    if matches!(kind, RecurrenceKindTag::Weekly) {
        copy_claims(pool, &batches.bulk_claims).await?;
    }

    for (template_id, instance) in &batches.group {
        insert_single(pool, instance, retry_cfg).await?;
        inserted += 1;
        match kind {
            RecurrenceKindTag::Weekly => clone_group_row(pool, instance, *template_id).await?,
            RecurrenceKindTag::Monthly => create_group_row(pool, instance, *template_id).await?,
        }
    }

    Ok(inserted)
}

async fn bulk_insert(
    pool: &PgPool,
    instances: &[Instance],
    batch_size: usize,
    sleep_ms: u64,
    retry_cfg: &RetryConfig,
) -> anyhow::Result<usize> {
    if instances.is_empty() {
        return Ok(0);
    }
    let mut inserted = 0usize;
    for chunk in instances.chunks(batch_size.max(1)) {
        let chunk = chunk.to_vec();
        with_retry(retry_cfg, || {
            let pool = pool.clone();
            let chunk = chunk.clone();
            async move { insert_batch(&pool, &chunk).await }
        })
        .await?;
        inserted += chunk.len();

        if sleep_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
        }
    }
    Ok(inserted)
}

async fn insert_batch(pool: &PgPool, chunk: &[Instance]) -> Result<(), sqlx::Error> {
    let mut sql = String::from(
        "INSERT INTO instance (id, template_id, client_id, employee_id, company_id, group_id, \
         start_ts, end_ts, is_active, note, created_at) VALUES ",
    );
    let mut params = Vec::with_capacity(chunk.len() * COLUMNS_PER_ROW);

    for (i, instance) in chunk.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let base = i * COLUMNS_PER_ROW;
        sql.push('(');
        for col in 0..COLUMNS_PER_ROW {
            if col > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("${}", base + col + 1));
        }
        sql.push(')');
        params.push(instance);
    }

    let mut query = sqlx::query(&sql);
    for instance in params {
        query = query
            .bind(instance.id)
            .bind(instance.template_id)
            .bind(instance.client_id)
            .bind(instance.employee_id)
            .bind(instance.company_id)
            .bind(instance.group_id)
            .bind(instance.start_ts)
            .bind(instance.end_ts)
            .bind(instance.is_active)
            .bind(&instance.note)
            .bind(instance.created_at);
    }

    query.execute(pool).await?;
    Ok(())
}

async fn insert_single(pool: &PgPool, instance: &Instance, retry_cfg: &RetryConfig) -> anyhow::Result<()> {
    with_retry(retry_cfg, || {
        let pool = pool.clone();
        let instance = instance.clone();
        async move {
            sqlx::query(
                r#"
                INSERT INTO instance (id, template_id, client_id, employee_id, company_id, group_id,
                                       start_ts, end_ts, is_active, note, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(instance.id)
            .bind(instance.template_id)
            .bind(instance.client_id)
            .bind(instance.employee_id)
            .bind(instance.company_id)
            .bind(instance.group_id)
            .bind(instance.start_ts)
            .bind(instance.end_ts)
            .bind(instance.is_active)
            .bind(&instance.note)
            .bind(instance.created_at)
            .execute(&pool)
            .await
        }
    })
    .await?;
    Ok(())
}

/// Set-based copy from the scan-area template tables into the per-instance
/// table, joined on the template id each materialized instance descends
/// from.
async fn copy_scan_areas(pool: &PgPool, instances: &[Instance]) -> anyhow::Result<()> {
    for instance in instances {
        sqlx::query(
            r#"
            INSERT INTO instance_scan_area (instance_id, scan_area_id)
            SELECT $1, tsa.scan_area_id
            FROM template_scan_area tsa
            WHERE tsa.template_id = $2
            "#,
        )
        .bind(instance.id)
        .bind(instance.template_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Set-based copy from claim templates (weekly only).
async fn copy_claims(pool: &PgPool, instances: &[Instance]) -> anyhow::Result<()> {
    for instance in instances {
        sqlx::query(
            r#"
            INSERT INTO instance_claim (instance_id, claim_id)
            SELECT $1, tc.claim_id
            FROM template_claim tc
            WHERE tc.template_id = $2
            "#,
        )
        .bind(instance.id)
        .bind(instance.template_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Weekly group clone: copy the existing group row tied to the template's
/// `group_id`, stamped with the new instance id.
async fn clone_group_row(pool: &PgPool, instance: &Instance, template_id: TemplateId) -> anyhow::Result<()> {
    let Some(group_id): Option<GroupId> = instance.group_id else {
        return Ok(());
    };
    sqlx::query(
        r#"
        INSERT INTO instance_group (instance_id, source_group_id, is_employee_schedule, is_client_schedule)
        SELECT $1, $2, g.is_employee_schedule, g.is_client_schedule
        FROM instance_group_template g
        WHERE g.group_id = $2 AND g.template_id = $3
        "#,
    )
    .bind(instance.id)
    .bind(group_id)
    .bind(template_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Monthly group create: a fresh group row rather than a clone, since a
/// monthly occurrence has no prior sibling group row to copy forward from.
async fn create_group_row(pool: &PgPool, instance: &Instance, _template_id: TemplateId) -> anyhow::Result<()> {
    let Some(group_id): Option<GroupId> = instance.group_id else {
        return Ok(());
    };
    sqlx::query(
        r#"
        INSERT INTO instance_group (instance_id, source_group_id, is_employee_schedule, is_client_schedule)
        VALUES ($1, $2, TRUE, FALSE)
        "#,
    )
    .bind(instance.id)
    .bind(group_id)
    .execute(pool)
    .await?;
    Ok(())
}
