//! octorobot - a GitHub App framework.
//!
//! Webhook deliveries are verified, decoded and fanned out to every loaded
//! plugin. Each plugin handler gets its own [`context::Context`] carrying a
//! GitHub client that is authenticated for the event's installation,
//! serialized through a rate limiter and instrumented with tracing.

pub mod auth;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod github;
pub mod logging;
pub mod plugin;
pub mod robot;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;

pub use context::{Context, ContextError};
pub use dispatch::{DispatchReport, Dispatcher};
pub use plugin::{LoadError, PluginCatalog, PluginFn, PluginLoader, PluginSource};
pub use robot::Robot;
pub use webhooks::{EventFilter, WebhookEvent};
