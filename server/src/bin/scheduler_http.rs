//! HTTP control plane entry point. Init tracing, load env, build a pool,
//! build the router, serve with graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use scheduler_core::domains::scheduler::engine::SchedulerEngine;
use scheduler_core::domains::scheduler::session::InProcessGuard;
use scheduler_core::kernel::ServerKernel;
use scheduler_core::server::build_app;
use scheduler_core::SchedulerConfig;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scheduler_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("Starting shift materialization engine (HTTP control plane)");

    let config = SchedulerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(()) => tracing::info!("migrations applied"),
        Err(err) => {
            tracing::warn!(%err, "migration run failed, falling back to runtime schema assurance");
            scheduler_core::kernel::schema::ensure(&pool).await?;
        }
    }

    let http_port = config.http_port;
    let api_key = config.api_key.clone();

    let kernel = ServerKernel::new(pool, config);
    let engine = Arc::new(SchedulerEngine::new(kernel, InProcessGuard::new()));
    let shutdown = CancellationToken::new();

    let app = build_app(engine, api_key, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{http_port}"))?;
    tracing::info!(port = http_port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, cancelling in-flight run");
    shutdown.cancel();
}
