//! Application setup - one `Router`, shared state via `Extension`,
//! middleware layered on top, `TraceLayer` for request logging.

use std::sync::Arc;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
    BoxError, Extension, Router,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::scheduler::engine::SchedulerEngine;
use crate::domains::scheduler::session::InProcessGuard;
use crate::server::middleware::require_api_key;
use crate::server::routes::{run_handler, status_handler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state for every handler - the engine plus what the middleware and
/// status route need that the engine doesn't expose directly.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SchedulerEngine>,
    pub guard: InProcessGuard,
    pub api_key: Option<String>,
    pub shutdown: CancellationToken,
}

pub fn build_app(engine: Arc<SchedulerEngine>, api_key: Option<String>, shutdown: CancellationToken) -> Router {
    let guard = engine.guard().clone();
    let state = AppState {
        engine,
        guard,
        api_key,
        shutdown,
    };

    let api_key_for_middleware = state.api_key.clone();
    let run_routes = Router::new().route("/scheduler/run", post(run_handler)).layer(
        axum_middleware::from_fn(move |req, next| require_api_key(api_key_for_middleware.clone(), req, next)),
    );

    Router::new()
        .route("/scheduler/status", get(status_handler))
        .merge(run_routes)
        .layer(Extension(state))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(600))),
        )
        .layer(TraceLayer::new_for_http())
}

/// A run's HTTP request can only time out if the handler itself hangs past
/// the 600s ceiling - the engine's own cancellation plumbing should make
/// this unreachable in practice, but `TimeoutLayer` needs an infallible
/// handler to satisfy `Router::layer`'s bound either way.
async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}
