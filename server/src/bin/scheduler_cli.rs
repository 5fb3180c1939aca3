//! Standalone batch CLI entry point. Runs the full materialization pipeline
//! once against `DATABASE_URL`, honoring SIGINT as a cooperative cancel,
//! then exits with the status-mapped code.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use scheduler_core::domains::scheduler::engine::{RunOptions, SchedulerEngine};
use scheduler_core::domains::scheduler::models::RunStatus;
use scheduler_core::domains::scheduler::session::InProcessGuard;
use scheduler_core::kernel::{schema, ServerKernel};
use scheduler_core::SchedulerConfig;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Batch shift materialization engine - expands recurring shift templates
/// into dated instances for one run.
#[derive(Parser)]
#[command(name = "scheduler_cli")]
#[command(about = "Runs the shift materialization engine once")]
struct Cli {
    /// Base timestamp to run "as of" (ISO-8601). Defaults to now.
    base_ts: Option<DateTime<Utc>>,

    /// Restrict the run to a single company.
    #[arg(long)]
    company_id: Option<i64>,

    /// Restrict the run to a single template (the lean path that bypasses
    /// cleanup, audit, and finalization for an ad hoc single-template run).
    #[arg(long)]
    template_id: Option<i64>,

    /// Override the configured weekly lookahead window, in days.
    #[arg(long)]
    advance_days: Option<i64>,

    /// Override the configured monthly lookahead window, in months.
    #[arg(long)]
    monthly_months_ahead: Option<i64>,

    /// Force the targeted template(s) to regenerate from scratch.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scheduler_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    let cli = Cli::parse();
    let config = SchedulerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    schema::ensure(&pool).await.context("failed to assure engine schema")?;

    let kernel = ServerKernel::new(pool, config);
    let engine = SchedulerEngine::new(kernel, InProcessGuard::new());

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received SIGINT, requesting cooperative cancellation");
            cancel_for_signal.cancel();
        }
    });

    let opts = RunOptions {
        company_id: cli.company_id,
        template_id: cli.template_id,
        advance_days: cli.advance_days,
        monthly_months_ahead: cli.monthly_months_ahead,
        reset: cli.reset,
    }
    .normalize();

    let base_ts = cli.base_ts.unwrap_or_else(Utc::now);

    match engine.run(base_ts, opts, cancel).await {
        Ok(summary) => {
            tracing::info!(
                status = summary.status.as_str(),
                created = summary.created_count,
                duplicate = summary.duplicate_count,
                overlap = summary.overlap_count,
                errors = summary.error_count,
                "run finished"
            );
            std::process::exit(if summary.status == RunStatus::Cancelled { 1 } else { 0 });
        }
        Err(err) => {
            tracing::error!(%err, "run failed");
            std::process::exit(err.exit_code());
        }
    }
}
