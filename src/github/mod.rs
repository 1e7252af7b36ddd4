//! GitHub REST client shared by all plugins.
//!
//! Every request flows through the same pipeline: interceptors, then a FIFO
//! rate limiter, then credentials, then the HTTP transport. Pagination and
//! the installation-token exchange in [`crate::auth`] are built on top of
//! [`GitHubClient::request`], so they get the same limiting and logging.

mod client;
mod error;
mod interceptor;
mod limiter;
mod pagination;
mod request;
mod transport;

pub use client::{ClientConfig, GitHubClient};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use interceptor::{Interceptor, RequestLogger};
pub use limiter::{LimiterConfig, RateLimiter, RatePermit};
pub use pagination::PageControl;
pub use request::{ApiRequest, ApiResponse, Params};
pub use transport::{OctocrabTransport, Transport};
