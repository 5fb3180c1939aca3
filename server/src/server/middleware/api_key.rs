//! API key middleware - a static shared-secret header comparison guarding
//! the run-triggering endpoint.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const API_KEY_HEADER: &str = "x-api-key";

/// Rejects the request with 401 unless `X-Api-Key` matches the configured
/// key. A server started with no configured key rejects every call - there
/// is no "open" mode for a run-triggering endpoint.
pub async fn require_api_key(api_key: Option<String>, request: Request<Body>, next: Next) -> Response {
    let Some(expected) = api_key else {
        return (StatusCode::UNAUTHORIZED, "scheduler API key not configured").into_response();
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(given) if given == expected => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "missing or invalid X-Api-Key").into_response(),
    }
}
