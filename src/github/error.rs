//! GitHub API error types.
//!
//! Every failure a request can produce is reported as a [`GitHubApiError`].
//! The HTTP status is preserved exactly as the API returned it so callers can
//! make their own decisions; nothing in this crate retries automatically.
//!
//! The one status with special meaning is 404, which [`crate::context`] turns
//! into a default value when a repository config file does not exist.

use std::fmt;
use thiserror::Error;

use crate::auth::AuthError;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// The API answered with a non-success HTTP status.
    Http,

    /// The request never produced a response.
    ///
    /// Examples:
    /// - Connection refused or reset
    /// - DNS resolution failures
    /// - Transport-level timeouts
    Network,

    /// The response body could not be decoded as JSON.
    Decode,

    /// No credential could be produced for the request.
    ///
    /// Either the app token could not be signed or the installation token
    /// exchange failed.
    Auth,

    /// The request could not be built, e.g. a route placeholder had no value.
    InvalidRequest,
}

/// A GitHub API error.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    /// The kind of error.
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if the API answered.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates an error for a non-success HTTP response.
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Http,
            status_code: Some(status_code),
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error for a non-success response, taking the message from
    /// the response body when GitHub supplied one.
    ///
    /// GitHub error bodies look like `{"message": "Not Found", "documentation_url": "..."}`.
    pub fn from_response_body(status_code: u16, body: &serde_json::Value) -> Self {
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| default_reason(status_code));
        Self::http(status_code, message)
    }

    /// Creates a network error from an octocrab error.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        Self {
            kind: GitHubErrorKind::Network,
            status_code: None,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Creates a network error without an underlying source.
    pub fn network_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Network,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a decode error for a response whose body is not valid JSON.
    pub fn decode(status_code: u16, source: serde_json::Error) -> Self {
        Self {
            kind: GitHubErrorKind::Decode,
            status_code: Some(status_code),
            message: format!("invalid JSON in response body: {}", source),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an authentication error.
    pub fn auth(source: AuthError) -> Self {
        Self {
            kind: GitHubErrorKind::Auth,
            status_code: None,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an error for a request that could not be built.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::InvalidRequest,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if the API answered 404 Not Found.
    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }
}

/// Fallback message when an error response carries no `message` field.
fn default_reason(status_code: u16) -> String {
    http::StatusCode::from_u16(status_code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unexpected status")
        .to_string()
}
