//! Request interceptors.
//!
//! The client runs an ordered list of interceptors around every request:
//! `on_request` before the limiter is acquired, then exactly one of
//! `on_response` or `on_error` once the call has settled. Interceptors only
//! see shared references, so they can observe a call but never change its
//! outcome.

use tracing::debug;

use super::error::GitHubApiError;
use super::request::{ApiRequest, ApiResponse};

/// Observes requests passing through a [`super::GitHubClient`].
pub trait Interceptor: Send + Sync {
    /// Called before the request waits for the limiter.
    fn on_request(&self, _request: &ApiRequest) {}

    /// Called after a successful response.
    fn on_response(&self, _request: &ApiRequest, _response: &ApiResponse) {}

    /// Called after a failed request. The error is returned to the caller
    /// unchanged once every interceptor has seen it.
    fn on_error(&self, _request: &ApiRequest, _error: &GitHubApiError) {}
}

/// Logs every request outcome at `debug` level.
///
/// Request params are logged as a structured field; headers never are, since
/// they carry the bearer token.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Interceptor for RequestLogger {
    fn on_response(&self, request: &ApiRequest, response: &ApiResponse) {
        debug!(
            params = %serde_json::Value::Object(request.params.clone()),
            "GitHub request: {} {} - {}",
            request.method,
            request.display_url(),
            response.status
        );
    }

    fn on_error(&self, request: &ApiRequest, error: &GitHubApiError) {
        let status = error
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        debug!(
            params = %serde_json::Value::Object(request.params.clone()),
            error = %error,
            "GitHub request: {} {} - {:?} {}",
            request.method,
            request.display_url(),
            error.kind,
            status
        );
    }
}
