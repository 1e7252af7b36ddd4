//! The registration object a plugin configures at load time.
//!
//! A plugin's init function receives a fresh [`Robot`], subscribes handlers
//! to events and optionally mounts HTTP routes. The loader then freezes the
//! robot behind an `Arc` and registers it with the dispatcher.
//!
//! The only state a robot keeps after loading is its per-installation client
//! cache: every context built for the same installation gets the same client,
//! so the plugin's requests for that installation share one limiter.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use axum::Router;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use thiserror::Error;
use tracing::{Instrument, info_span};

use crate::auth::GitHubApp;
use crate::context::Context;
use crate::github::GitHubClient;
use crate::types::InstallationId;
use crate::webhooks::{EventFilter, InvalidEventFilter, WebhookEvent};

/// A boxed event handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// How a single handler invocation failed.
#[derive(Debug, Error)]
pub enum HandlerFailure {
    #[error("{0:#}")]
    Error(anyhow::Error),

    #[error("handler panicked: {0}")]
    Panic(String),
}

/// The result of one handler invocation.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub plugin: String,
    pub filter: EventFilter,
    pub result: Result<(), HandlerFailure>,
}

/// A plugin's handlers, routes and client cache.
pub struct Robot {
    name: String,
    app: GitHubApp,
    handlers: Vec<(EventFilter, Handler)>,
    routes: Vec<(String, Router)>,
    clients: Mutex<HashMap<InstallationId, GitHubClient>>,
}

impl Robot {
    pub fn new(name: impl Into<String>, app: GitHubApp) -> Self {
        Self {
            name: name.into(),
            app,
            handlers: Vec::new(),
            routes: Vec::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribes `handler` to events matching `filter` (`*`, `issues` or
    /// `issues.opened`).
    ///
    /// ```ignore
    /// robot.on("issues.opened", |context: Context| async move {
    ///     let params = context.issue_params_with(body("Thanks for opening this issue!"))?;
    ///     context.github()
    ///         .request(ApiRequest::post("/repos/{owner}/{repo}/issues/{number}/comments").params(params))
    ///         .await?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn on<F, Fut>(&mut self, filter: &str, handler: F) -> Result<&mut Self, InvalidEventFilter>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let filter: EventFilter = filter.parse()?;
        let handler: Handler = Arc::new(move |context| handler(context).boxed());
        self.handlers.push((filter, handler));
        Ok(self)
    }

    /// Mounts `router` under `path` on the app's HTTP server.
    pub fn route(&mut self, path: impl Into<String>, router: Router) -> &mut Self {
        self.routes.push((path.into(), router));
        self
    }

    /// Removes the routes so the loader can mount them.
    pub(crate) fn take_routes(&mut self) -> Vec<(String, Router)> {
        std::mem::take(&mut self.routes)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Handlers subscribed to `event`, in registration order.
    pub fn handlers_for<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> impl Iterator<Item = &'a (EventFilter, Handler)> + 'a {
        self.handlers.iter().filter(|(filter, _)| filter.matches(event))
    }

    /// Returns the client for `installation`, creating it on first use.
    /// Events without an installation get the app-authenticated client.
    pub fn client_for(&self, installation: Option<InstallationId>) -> GitHubClient {
        let Some(id) = installation else {
            return self.app.app_client();
        };
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(id)
            .or_insert_with(|| self.app.installation_client(id))
            .clone()
    }

    /// Runs every matching handler concurrently, each with its own context,
    /// and waits for all of them to settle.
    ///
    /// Errors and panics are captured per handler; one failing handler never
    /// stops its siblings.
    pub async fn receive(&self, event: &WebhookEvent) -> Vec<HandlerOutcome> {
        let matching: Vec<_> = self.handlers_for(event).cloned().collect();
        if matching.is_empty() {
            return Vec::new();
        }

        let github = self.client_for(event.installation_id());
        let runs = matching.into_iter().map(|(filter, handler)| {
            let span = info_span!(
                "handler",
                plugin = %self.name,
                delivery = %event.id(),
                event = %event.qualified_name(),
                filter = %filter,
            );
            let context = Context::new(event.clone(), github.clone(), span.clone());
            let run = AssertUnwindSafe(async move { handler(context).await }).catch_unwind();

            async move {
                let result = match run.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(HandlerFailure::Error(e)),
                    Err(panic) => Err(HandlerFailure::Panic(panic_message(panic.as_ref()))),
                };
                HandlerOutcome {
                    plugin: self.name.clone(),
                    filter,
                    result,
                }
            }
            .instrument(span)
        });

        join_all(runs).await
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field(
                "handlers",
                &self.handlers.iter().map(|(f, _)| f.to_string()).collect::<Vec<_>>(),
            )
            .field("routes", &self.routes.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
