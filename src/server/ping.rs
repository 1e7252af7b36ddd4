//! Liveness endpoint.

use axum::http::StatusCode;

/// Returns `200 PONG` while the server is accepting connections.
pub async fn ping_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "PONG")
}
