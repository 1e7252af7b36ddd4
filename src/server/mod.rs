//! HTTP server.
//!
//! # Endpoints
//!
//! - `POST {webhook_path}` - Accepts GitHub webhook deliveries (returns 202 Accepted)
//! - `GET /ping` - Returns `PONG` while the server is running
//! - whatever routes plugins mounted at load time

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::webhooks::WebhookSecret;

pub mod ping;
pub mod webhook;

pub use ping::ping_handler;
pub use webhook::{WebhookError, webhook_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Loaded plugins.
    dispatcher: Dispatcher,

    /// Webhook secret for HMAC-SHA256 signature verification.
    webhook_secret: WebhookSecret,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, webhook_secret: impl Into<WebhookSecret>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                dispatcher,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn webhook_secret(&self) -> &WebhookSecret {
        &self.inner.webhook_secret
    }
}

/// The server's own routes with no-op handlers.
///
/// Handed to [`crate::plugin::PluginLoader::with_reserved`] so plugin routes
/// that would clash with them fail to load rather than panic in
/// [`build_router`].
pub fn reserved_routes(webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(|| async {}))
        .route("/ping", get(|| async {}))
}

/// Builds the router: webhook endpoint, `/ping`, and plugin routes.
pub fn build_router(app_state: AppState, webhook_path: &str, plugin_routes: Router) -> Router {
    Router::new()
        .route(webhook_path, post(webhook_handler))
        .route("/ping", get(ping_handler))
        .with_state(app_state)
        .merge(plugin_routes)
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
