//! Shared test infrastructure - one Postgres container reused across every
//! integration test in this binary.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to test database")?;
        scheduler_core::kernel::schema::ensure(&pool)
            .await
            .context("failed to create engine-owned tables")?;
        create_domain_fixture_tables(&pool)
            .await
            .context("failed to create domain fixture tables")?;
        pool.close().await;

        Ok(Self { db_url, _postgres: postgres })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to initialize shared test infra") })
            .await
    }
}

/// The engine doesn't own `shift_template`/`instance`/... - they belong to
/// the OLTP schema it reads from and writes into. Tests stand in for that
/// schema with the minimal columns `repository::snapshot`/`write` touch.
async fn create_domain_fixture_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shift_template (
            template_id     BIGINT PRIMARY KEY,
            recurring_kind  TEXT NOT NULL,
            week_stride     INT NOT NULL DEFAULT 1,
            nth_weekday     SMALLINT,
            days            SMALLINT NOT NULL DEFAULT 0,
            start_date      DATE NOT NULL,
            end_date        DATE NOT NULL DEFAULT '0001-01-01',
            last_run        DATE,
            time_in         TIME NOT NULL,
            time_out        TIME NOT NULL,
            day_span        INT NOT NULL DEFAULT 0,
            client_id       BIGINT NOT NULL,
            employee_id     BIGINT NOT NULL,
            company_id      BIGINT NOT NULL,
            group_id        BIGINT,
            schedule_kind   SMALLINT NOT NULL DEFAULT 0,
            is_active       BOOLEAN NOT NULL DEFAULT TRUE,
            is_reset        BOOLEAN NOT NULL DEFAULT FALSE,
            extra           JSONB
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance (
            id                      UUID PRIMARY KEY,
            template_id             BIGINT NOT NULL,
            client_id               BIGINT NOT NULL,
            employee_id             BIGINT NOT NULL,
            company_id              BIGINT NOT NULL,
            group_id                BIGINT,
            start_ts                TIMESTAMPTZ NOT NULL,
            end_ts                  TIMESTAMPTZ NOT NULL,
            external_timecard_ref   TEXT,
            actual_start_ts         TIMESTAMPTZ,
            actual_end_ts           TIMESTAMPTZ,
            is_active               BOOLEAN NOT NULL DEFAULT TRUE,
            note                    TEXT NOT NULL DEFAULT '',
            created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at              TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance_claim (
            instance_id UUID NOT NULL,
            claim_id    BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance_scan_area (
            instance_id  UUID NOT NULL,
            scan_area_id BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_scan_area (
            template_id  BIGINT NOT NULL,
            scan_area_id BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_claim (
            template_id BIGINT NOT NULL,
            claim_id    BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance_group_template (
            group_id             BIGINT NOT NULL,
            template_id          BIGINT NOT NULL,
            is_employee_schedule BOOLEAN NOT NULL DEFAULT TRUE,
            is_client_schedule   BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance_group (
            instance_id          UUID NOT NULL,
            source_group_id      BIGINT NOT NULL,
            is_employee_schedule BOOLEAN NOT NULL DEFAULT TRUE,
            is_client_schedule   BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub struct TestHarness {
    pub db_pool: PgPool,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect to test database")?;
        Ok(Self { db_pool })
    }

    /// Truncates every engine and fixture table so tests don't see each
    /// other's rows - cheaper than a fresh container per test.
    pub async fn reset(&self) {
        sqlx::query(
            "TRUNCATE shift_template, instance, instance_claim, instance_scan_area, \
             template_scan_area, template_claim, instance_group_template, instance_group, \
             run_summary, audit_log, conflict_log, multi_week_tracking, scheduler_session",
        )
        .execute(&self.db_pool)
        .await
        .expect("failed to truncate fixture tables");
    }

    pub async fn insert_weekly_template(&self, t: &WeeklyTemplateFixture) {
        sqlx::query(
            r#"
            INSERT INTO shift_template
                (template_id, recurring_kind, week_stride, nth_weekday, days, start_date, end_date,
                 last_run, time_in, time_out, day_span, client_id, employee_id, company_id,
                 group_id, schedule_kind, is_active, is_reset)
            VALUES ($1, 'WEEKLY', $2, NULL, $3, $4, COALESCE($5, '0001-01-01'::date), $6,
                    $7, $8, 0, $9, $10, $11, NULL, 0, TRUE, FALSE)
            "#,
        )
        .bind(t.template_id)
        .bind(t.week_stride)
        .bind(t.days.0 as i16)
        .bind(t.start_date)
        .bind(t.end_date)
        .bind(t.last_run)
        .bind(t.time_in)
        .bind(t.time_out)
        .bind(t.client_id)
        .bind(t.employee_id)
        .bind(t.company_id)
        .execute(&self.db_pool)
        .await
        .expect("failed to insert weekly template fixture");
    }

    pub async fn insert_open_claim_template(&self, t: &OpenClaimTemplateFixture) {
        sqlx::query(
            r#"
            INSERT INTO shift_template
                (template_id, recurring_kind, week_stride, nth_weekday, days, start_date, end_date,
                 last_run, time_in, time_out, day_span, client_id, employee_id, company_id,
                 group_id, schedule_kind, is_active, is_reset)
            VALUES ($1, 'WEEKLY', 1, NULL, $2, $3, '0001-01-01'::date, $4,
                    $5, $6, 0, $7, 0, $8, NULL, 1, TRUE, FALSE)
            "#,
        )
        .bind(t.template_id)
        .bind(t.days.0 as i16)
        .bind(t.start_date)
        .bind(t.last_run)
        .bind(t.time_in)
        .bind(t.time_out)
        .bind(t.client_id)
        .bind(t.company_id)
        .execute(&self.db_pool)
        .await
        .expect("failed to insert open-claim template fixture");
    }

    pub async fn insert_monthly_template(&self, t: &MonthlyTemplateFixture) {
        sqlx::query(
            r#"
            INSERT INTO shift_template
                (template_id, recurring_kind, week_stride, nth_weekday, days, start_date, end_date,
                 last_run, time_in, time_out, day_span, client_id, employee_id, company_id,
                 group_id, schedule_kind, is_active, is_reset)
            VALUES ($1, 'MONTHLY', 1, $2, $3, $4, '0001-01-01'::date, $5,
                    $6, $7, 0, $8, $9, $10, NULL, 0, TRUE, FALSE)
            "#,
        )
        .bind(t.template_id)
        .bind(t.nth_weekday)
        .bind(t.days.0 as i16)
        .bind(t.start_date)
        .bind(t.last_run)
        .bind(t.time_in)
        .bind(t.time_out)
        .bind(t.client_id)
        .bind(t.employee_id)
        .bind(t.company_id)
        .execute(&self.db_pool)
        .await
        .expect("failed to insert monthly template fixture");
    }

    pub async fn active_instance_count(&self, template_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM instance WHERE template_id = $1 AND is_active")
            .bind(template_id)
            .fetch_one(&self.db_pool)
            .await
            .expect("failed to count instances")
    }
}

pub struct WeeklyTemplateFixture {
    pub template_id: i64,
    pub week_stride: i32,
    pub days: scheduler_core::domains::scheduler::models::DaySet,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub last_run: Option<NaiveDate>,
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
    pub client_id: i64,
    pub employee_id: i64,
    pub company_id: i64,
}

pub struct OpenClaimTemplateFixture {
    pub template_id: i64,
    pub days: scheduler_core::domains::scheduler::models::DaySet,
    pub start_date: NaiveDate,
    pub last_run: Option<NaiveDate>,
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
    pub client_id: i64,
    pub company_id: i64,
}

pub struct MonthlyTemplateFixture {
    pub template_id: i64,
    pub nth_weekday: i16,
    pub days: scheduler_core::domains::scheduler::models::DaySet,
    pub start_date: NaiveDate,
    pub last_run: Option<NaiveDate>,
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
    pub client_id: i64,
    pub employee_id: i64,
    pub company_id: i64,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        let harness = Self::new().await.expect("failed to create test harness");
        harness.reset().await;
        harness
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
