//! `GET /scheduler/status` - unauthenticated, cheap, reads only the
//! in-process guard.

use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;

use crate::server::app::{AppState, VERSION};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub is_running: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub version: &'static str,
}

pub async fn status_handler(Extension(state): Extension<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy",
        is_running: state.guard.is_running(),
        timestamp: Utc::now(),
        version: VERSION,
    })
}
