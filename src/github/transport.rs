//! The HTTP transport underneath [`super::GitHubClient`].
//!
//! A transport sends one fully-authenticated request and returns whatever the
//! server answered, error statuses included. Rate limiting, credentials and
//! instrumentation all happen in the client before a request gets here, so
//! test transports stay trivial.

use futures::future::BoxFuture;
use octocrab::Octocrab;
use serde_json::Value;

use super::error::GitHubApiError;
use super::request::{ApiRequest, ApiResponse};

/// Sends a single REST request.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response for any HTTP status.
    ///
    /// Only failures that produce no response at all (network errors,
    /// undecodable bodies) are returned as errors.
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, GitHubApiError>>;
}

/// Transport backed by octocrab's raw request API.
///
/// The wrapped `Octocrab` should be unauthenticated: the client sets the
/// `Authorization` header on every request itself.
#[derive(Clone)]
pub struct OctocrabTransport {
    client: Octocrab,
}

impl OctocrabTransport {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a transport for `https://api.github.com`.
    pub fn github_com() -> Result<Self, octocrab::Error> {
        Ok(Self::new(Octocrab::builder().build()?))
    }

    /// Creates a transport for a GitHub Enterprise Server API root such as
    /// `https://ghe.example.com/api/v3`.
    pub fn with_base_uri(base_uri: &str) -> Result<Self, octocrab::Error> {
        Ok(Self::new(Octocrab::builder().base_uri(base_uri)?.build()?))
    }

    async fn send_inner(&self, request: ApiRequest) -> Result<ApiResponse, GitHubApiError> {
        let url = request.url()?;
        let body = request.json_body()?;

        let mut builder = http::Request::builder()
            .method(request.method.clone())
            .uri(url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let http_request = self
            .client
            .build_request(builder, body.as_ref())
            .map_err(GitHubApiError::from_octocrab)?;
        let response = self
            .client
            .execute(http_request)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| GitHubApiError::decode(status, e))?
        };

        Ok(ApiResponse {
            status,
            headers,
            data,
        })
    }
}

impl Transport for OctocrabTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, GitHubApiError>> {
        Box::pin(self.send_inner(request))
    }
}

impl std::fmt::Debug for OctocrabTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabTransport").finish_non_exhaustive()
    }
}
