//! Rate-limited, authenticated GitHub client.
//!
//! `GitHubClient` is the single point every outbound REST call passes
//! through. For each request it:
//!
//! 1. runs every interceptor's `on_request`;
//! 2. waits on the client's [`RateLimiter`], holding the permit until the
//!    call settles;
//! 3. attaches the `Authorization` header from its [`Credentials`];
//! 4. sends the request through the [`Transport`], turning error statuses
//!    into [`GitHubApiError`];
//! 5. runs `on_response` or `on_error` on every interceptor and returns the
//!    result unchanged.
//!
//! Cloning a client is cheap and clones share the limiter, so every plugin
//! context handed the same client queues behind the same limiter.

use std::sync::Arc;

use http::header::AUTHORIZATION;

use super::error::GitHubApiError;
use super::interceptor::{Interceptor, RequestLogger};
use super::limiter::{LimiterConfig, RateLimiter};
use super::request::{ApiRequest, ApiResponse};
use super::transport::Transport;
use crate::auth::Credentials;

/// Settings applied to every client built from it.
#[derive(Clone)]
pub struct ClientConfig {
    pub limiter: LimiterConfig,
    /// Interceptors in the order they run.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ClientConfig {
    /// Default limiter, no interceptors.
    pub fn bare() -> Self {
        Self {
            limiter: LimiterConfig::DEFAULT,
            interceptors: Vec::new(),
        }
    }

    /// No request spacing, with request logging. Meant for tests and for
    /// talking to local fakes.
    pub fn unthrottled() -> Self {
        Self {
            limiter: LimiterConfig::UNTHROTTLED,
            ..Self::default()
        }
    }

    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    /// Appends an interceptor; it runs after the ones already present.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }
}

impl Default for ClientConfig {
    /// Default limiter with the [`RequestLogger`] interceptor.
    fn default() -> Self {
        Self::bare().with_interceptor(Arc::new(RequestLogger))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("limiter", &self.limiter)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// A GitHub REST client with its own limiter and credentials.
#[derive(Clone)]
pub struct GitHubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    limiter: RateLimiter,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl GitHubClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                credentials,
                limiter: RateLimiter::new(config.limiter),
                interceptors: config.interceptors,
            }),
        }
    }

    /// Returns the credentials this client authenticates with.
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Returns the limiter settings.
    pub fn limiter_config(&self) -> LimiterConfig {
        self.inner.limiter.config()
    }

    /// Returns true if both handles refer to the same client (and limiter).
    pub fn same_client(&self, other: &GitHubClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sends a request through the interceptor pipeline and the limiter.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, GitHubApiError> {
        for interceptor in &self.inner.interceptors {
            interceptor.on_request(&request);
        }

        let result = self.execute(&request).await;

        match &result {
            Ok(response) => {
                for interceptor in &self.inner.interceptors {
                    interceptor.on_response(&request, response);
                }
            }
            Err(error) => {
                for interceptor in &self.inner.interceptors {
                    interceptor.on_error(&request, error);
                }
            }
        }

        result
    }

    /// Convenience for `request(ApiRequest::get(route).params(params))`.
    pub async fn get(
        &self,
        route: &str,
        params: super::Params,
    ) -> Result<ApiResponse, GitHubApiError> {
        self.request(ApiRequest::get(route).params(params)).await
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, GitHubApiError> {
        let _permit = self.inner.limiter.acquire().await;

        let mut outgoing = request.clone();
        let authorization = self
            .inner
            .credentials
            .authorization()
            .await
            .map_err(GitHubApiError::auth)?;
        if let Some(value) = authorization {
            outgoing.headers.insert(AUTHORIZATION, value);
        }

        let response = self.inner.transport.send(outgoing).await?;
        if !response.is_success() {
            return Err(GitHubApiError::from_response_body(
                response.status,
                &response.data,
            ));
        }

        Ok(response)
    }

    /// Returns true if `response` links to a next page.
    pub fn has_next_page(&self, response: &ApiResponse) -> bool {
        response.next_page_url().is_some()
    }

    /// Fetches the page after `response`, or `None` on the last page.
    pub async fn get_next_page(
        &self,
        response: &ApiResponse,
    ) -> Result<Option<ApiResponse>, GitHubApiError> {
        match response.next_page_url() {
            Some(url) => self.request(ApiRequest::get(url)).await.map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("installation", &self.inner.credentials.installation_id())
            .field("limiter", &self.inner.limiter.config())
            .finish_non_exhaustive()
    }
}
