//! End-to-end engine runs against a real Postgres container.

mod common;

use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use scheduler_core::domains::scheduler::engine::{RunOptions, SchedulerEngine};
use scheduler_core::domains::scheduler::models::DaySet;
use scheduler_core::domains::scheduler::session::InProcessGuard;
use scheduler_core::kernel::ServerKernel;
use scheduler_core::SchedulerConfig;
use test_context::test_context;
use tokio_util::sync::CancellationToken;

use common::{MonthlyTemplateFixture, OpenClaimTemplateFixture, TestHarness, WeeklyTemplateFixture};

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        database_url: String::new(),
        http_port: 0,
        api_key: None,
        advance_days: 45,
        monthly_months_ahead: 3,
        delete_batch_size: 500,
        insert_batch_size: 500,
        sleep_between_batches_ms: 0,
        max_retries: 3,
        retry_base_delay_ms: 10,
        history_retention_days: 120,
        audit_retention_days: 3,
        session_time_zone: "US/Eastern".to_string(),
    }
}

fn engine_for(pool: sqlx::PgPool) -> SchedulerEngine {
    let kernel = ServerKernel::new(pool, test_config());
    SchedulerEngine::new(kernel, InProcessGuard::new())
}

fn days(weekdays: &[chrono::Weekday]) -> DaySet {
    let mut bits: i16 = 0;
    for wd in weekdays {
        bits |= 1 << wd.num_days_from_sunday();
    }
    DaySet::from_bits(bits)
}

fn at_midnight(d: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
}

#[test_context(TestHarness)]
#[tokio::test]
async fn weekly_template_creates_instances_and_reruns_are_idempotent(ctx: &TestHarness) {
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    ctx.insert_weekly_template(&WeeklyTemplateFixture {
        template_id: 1,
        week_stride: 1,
        days: days(&[chrono::Weekday::Mon, chrono::Weekday::Wed]),
        start_date: monday,
        end_date: None,
        last_run: None,
        time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        client_id: 10,
        employee_id: 100,
        company_id: 1,
    })
    .await;

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(monday);

    let first = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("first run should succeed");
    assert!(first.created_count >= 2, "expects Mon+Wed instances for at least one week");

    let created_after_first = ctx.active_instance_count(1).await;
    assert!(created_after_first >= 2);

    let second = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("second run should succeed");
    assert_eq!(second.created_count, 0, "same-day rerun must not create duplicates");
    assert_eq!(
        ctx.active_instance_count(1).await,
        created_after_first,
        "rerun must not change the active instance count"
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn biweekly_template_skips_the_off_week(ctx: &TestHarness) {
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    ctx.insert_weekly_template(&WeeklyTemplateFixture {
        template_id: 2,
        week_stride: 2,
        days: days(&[chrono::Weekday::Mon]),
        start_date: monday,
        end_date: None,
        last_run: None,
        time_in: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        client_id: 20,
        employee_id: 200,
        company_id: 1,
    })
    .await;

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(monday);

    let summary = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("run should succeed");
    assert!(summary.created_count >= 1);

    // every instance emitted must land on a Monday that is an even number of
    // weeks after the anchor (week_stride = 2) - the off week is never hit.
    let rows: Vec<(chrono::DateTime<Utc>,)> =
        sqlx::query_as("SELECT start_ts FROM instance WHERE template_id = 2 AND is_active")
            .fetch_all(&ctx.db_pool)
            .await
            .unwrap();
    for (start_ts,) in rows {
        let delta_days = (start_ts.date_naive() - monday).num_days();
        assert_eq!(delta_days % 14, 0, "biweekly template must only land on the anchor week parity");
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn overlapping_individual_shift_is_blocked_not_retried(ctx: &TestHarness) {
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    ctx.insert_weekly_template(&WeeklyTemplateFixture {
        template_id: 3,
        week_stride: 1,
        days: days(&[chrono::Weekday::Mon]),
        start_date: monday,
        end_date: None,
        last_run: None,
        time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        client_id: 30,
        employee_id: 300,
        company_id: 1,
    })
    .await;

    // Same employee, overlapping window, different client/template - must be
    // blocked as an overlap rather than silently coexisting.
    ctx.insert_weekly_template(&WeeklyTemplateFixture {
        template_id: 4,
        week_stride: 1,
        days: days(&[chrono::Weekday::Mon]),
        start_date: monday,
        end_date: None,
        last_run: None,
        time_in: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        client_id: 31,
        employee_id: 300,
        company_id: 1,
    })
    .await;

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(monday);

    let summary = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("run should succeed");

    assert!(summary.overlap_count >= 1, "the second, overlapping candidate must be blocked");
    assert_eq!(ctx.active_instance_count(4).await, 0, "the blocked template must not get an instance");
    assert!(ctx.active_instance_count(3).await >= 1, "the first, non-conflicting template still runs");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn monthly_template_lands_on_the_configured_weekday(ctx: &TestHarness) {
    // First Friday of September 2026.
    let start = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();

    ctx.insert_monthly_template(&MonthlyTemplateFixture {
        template_id: 5,
        nth_weekday: 1,
        days: days(&[chrono::Weekday::Fri]),
        start_date: start,
        last_run: None,
        time_in: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        client_id: 50,
        employee_id: 500,
        company_id: 1,
    })
    .await;

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(start);

    let summary = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("run should succeed");
    assert!(summary.created_count >= 1);

    let rows: Vec<(chrono::DateTime<Utc>,)> =
        sqlx::query_as("SELECT start_ts FROM instance WHERE template_id = 5 AND is_active")
            .fetch_all(&ctx.db_pool)
            .await
            .unwrap();
    assert!(!rows.is_empty());
    for (start_ts,) in rows {
        assert_eq!(start_ts.date_naive().weekday(), chrono::Weekday::Fri);
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn open_claim_templates_coexist_at_the_same_slot(ctx: &TestHarness) {
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    for template_id in [7, 8] {
        ctx.insert_open_claim_template(&OpenClaimTemplateFixture {
            template_id,
            days: days(&[chrono::Weekday::Mon]),
            start_date: monday,
            last_run: None,
            time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            time_out: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            client_id: 70,
            company_id: 1,
        })
        .await;
    }

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(monday);

    let first = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("first run should succeed");
    assert!(
        first.created_count >= 2,
        "both open-claim templates should each get their own instance at the identical slot"
    );
    assert!(ctx.active_instance_count(7).await >= 1);
    assert!(ctx.active_instance_count(8).await >= 1);

    let second = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("second run should succeed");
    assert_eq!(second.created_count, 0, "rerun must not create duplicates for either open-claim template");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn reset_template_regenerates_instances(ctx: &TestHarness) {
    let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();

    ctx.insert_weekly_template(&WeeklyTemplateFixture {
        template_id: 6,
        week_stride: 1,
        days: days(&[chrono::Weekday::Mon]),
        start_date: monday,
        end_date: None,
        last_run: Some(monday),
        time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        time_out: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        client_id: 60,
        employee_id: 600,
        company_id: 1,
    })
    .await;

    sqlx::query("UPDATE shift_template SET is_reset = TRUE WHERE template_id = 6")
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let engine = engine_for(ctx.db_pool.clone());
    let base_ts = at_midnight(monday);

    let summary = engine
        .run(base_ts, RunOptions::default(), CancellationToken::new())
        .await
        .expect("run should succeed");

    assert!(summary.created_count >= 1, "a reset template must regenerate even though last_run already covers today");

    let is_reset: bool = sqlx::query_scalar("SELECT is_reset FROM shift_template WHERE template_id = 6")
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert!(!is_reset, "cleanup must clear is_reset for every reset template, not just multi-week ones");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn lean_path_rejects_unknown_template(ctx: &TestHarness) {
    let engine = engine_for(ctx.db_pool.clone());
    let result = engine.run_single_template(999_999, Utc::now(), false).await;
    assert!(matches!(
        result,
        Err(scheduler_core::EngineError::Validation(_))
    ));
}
