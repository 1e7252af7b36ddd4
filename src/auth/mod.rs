//! GitHub App authentication.
//!
//! - [`jwt`]: app tokens signed with the app's private key
//! - [`installation`]: installation tokens exchanged with an app token
//!
//! [`Credentials`] decides which `Authorization` header a request carries, and
//! [`GitHubApp`] builds clients authenticated as the app or as one of its
//! installations.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderValue;
use thiserror::Error;

use crate::github::{ClientConfig, GitHubApiError, GitHubClient, Transport};
use crate::types::{AppId, InstallationId};

pub mod installation;
pub mod jwt;

pub use installation::{InstallationToken, InstallationTokens};
pub use jwt::{AppCredential, SignedToken, TokenGenerator};

/// Errors produced while authenticating.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The private key is not a valid RSA key.
    #[error("invalid private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    /// The app token could not be signed.
    #[error("failed to sign app token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// The installation token exchange request failed.
    #[error("installation token exchange failed: {0}")]
    Exchange(#[source] Box<GitHubApiError>),

    /// The exchange succeeded but the body was not a token.
    #[error("invalid installation token response: {0}")]
    InvalidTokenResponse(String),

    /// A token contained bytes that cannot appear in a header.
    #[error("token is not a valid header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// How a client authenticates its requests.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// No `Authorization` header.
    Anonymous,

    /// A fixed token, e.g. a personal access token.
    Token(String),

    /// A freshly signed app token for every request.
    App(TokenGenerator),

    /// The installation's access token, exchanged on demand and cached.
    Installation {
        id: InstallationId,
        tokens: InstallationTokens,
    },
}

impl Credentials {
    /// Produces the `Authorization` header value for the next request.
    ///
    /// Returns a boxed future because installation credentials issue a request
    /// of their own through the app client.
    pub fn authorization(&self) -> BoxFuture<'_, Result<Option<HeaderValue>, AuthError>> {
        Box::pin(async move {
            let token = match self {
                Credentials::Anonymous => return Ok(None),
                Credentials::Token(token) => token.clone(),
                Credentials::App(generator) => generator.generate()?.as_str().to_string(),
                Credentials::Installation { id, tokens } => tokens.token(*id).await?,
            };

            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            Ok(Some(value))
        })
    }

    /// Returns the installation these credentials act for, if any.
    pub fn installation_id(&self) -> Option<InstallationId> {
        match self {
            Credentials::Installation { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Builds authenticated clients for one GitHub App.
///
/// Every client shares the transport. The app client and the installation
/// token cache are created once; each installation client gets its own
/// limiter.
#[derive(Clone)]
pub struct GitHubApp {
    inner: Arc<GitHubAppInner>,
}

struct GitHubAppInner {
    generator: TokenGenerator,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    app_client: GitHubClient,
    tokens: InstallationTokens,
}

impl GitHubApp {
    /// Creates the app from its credential and a transport.
    pub fn new(credential: AppCredential, transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let generator = TokenGenerator::new(credential);
        let app_client = GitHubClient::new(
            Arc::clone(&transport),
            Credentials::App(generator.clone()),
            config.clone(),
        );
        let tokens = InstallationTokens::new(app_client.clone());

        Self {
            inner: Arc::new(GitHubAppInner {
                generator,
                transport,
                config,
                app_client,
                tokens,
            }),
        }
    }

    pub fn app_id(&self) -> AppId {
        self.inner.generator.app_id()
    }

    /// Returns the token generator for callers that need a raw app token.
    pub fn token_generator(&self) -> &TokenGenerator {
        &self.inner.generator
    }

    /// Returns the client authenticated as the app itself.
    pub fn app_client(&self) -> GitHubClient {
        self.inner.app_client.clone()
    }

    /// Builds a new client authenticated as `installation`.
    ///
    /// The client has its own limiter; share it by cloning rather than calling
    /// this again.
    pub fn installation_client(&self, installation: InstallationId) -> GitHubClient {
        GitHubClient::new(
            Arc::clone(&self.inner.transport),
            Credentials::Installation {
                id: installation,
                tokens: self.inner.tokens.clone(),
            },
            self.inner.config.clone(),
        )
    }
}

impl std::fmt::Debug for GitHubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubApp")
            .field("app_id", &self.app_id())
            .finish_non_exhaustive()
    }
}
