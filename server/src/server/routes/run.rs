//! `POST /scheduler/run` - triggers one engine run. Guarded by
//! `require_api_key`, so by the time this handler runs the caller is already
//! authenticated.

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use crate::domains::scheduler::engine::RunOptions;
use crate::domains::scheduler::error::EngineError;
use crate::server::app::AppState;

/// 499 isn't a registered status code, but it's the common nginx
/// client-closed-request convention, repurposed here for a cooperatively
/// cancelled run.
const STATUS_CLIENT_CANCELLED: u16 = 499;

pub async fn run_handler(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    let opts = if body.is_empty() {
        RunOptions::default()
    } else {
        match serde_json::from_slice::<RunOptions>(&body) {
            Ok(opts) => opts,
            Err(err) => {
                return (StatusCode::BAD_REQUEST, format!("invalid request body: {err}")).into_response();
            }
        }
    }
    .normalize();

    let cancel = state.shutdown.child_token();
    let result = state.engine.run(Utc::now(), opts, cancel).await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(EngineError::Blocked) => {
            (StatusCode::CONFLICT, "another run is already in progress").into_response()
        }
        Err(EngineError::Cancelled) => (
            StatusCode::from_u16(STATUS_CLIENT_CANCELLED).unwrap(),
            "run cancelled",
        )
            .into_response(),
        Err(EngineError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg).into_response(),
        Err(err @ EngineError::Storage(_)) | Err(err @ EngineError::Unrecoverable(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
