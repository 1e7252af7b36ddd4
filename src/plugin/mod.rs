//! Plugins and how they are found.
//!
//! A plugin is an init function that configures a [`Robot`]. Plugins reach
//! the loader as a [`PluginSource`]: either the init function itself, or the
//! name of a plugin compiled into the binary and listed in a
//! [`PluginCatalog`]. Names are resolved once, at load time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::robot::Robot;

pub mod builtin;
mod loader;

pub use loader::PluginLoader;

type InitFn = dyn Fn(&mut Robot) -> anyhow::Result<()> + Send + Sync;

/// A named plugin init function.
#[derive(Clone)]
pub struct PluginFn {
    name: String,
    init: Arc<InitFn>,
}

impl PluginFn {
    pub fn new<F>(name: impl Into<String>, init: F) -> Self
    where
        F: Fn(&mut Robot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            init: Arc::new(init),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the init function against `robot`.
    pub fn init(&self, robot: &mut Robot) -> anyhow::Result<()> {
        (self.init)(robot)
    }
}

impl fmt::Debug for PluginFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginFn").field(&self.name).finish()
    }
}

/// Where a plugin comes from.
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// A plugin registered in the loader's catalog under this name.
    Named(String),
    /// An init function supplied directly.
    Init(PluginFn),
}

impl From<PluginFn> for PluginSource {
    fn from(plugin: PluginFn) -> Self {
        PluginSource::Init(plugin)
    }
}

impl From<&str> for PluginSource {
    fn from(name: &str) -> Self {
        PluginSource::Named(name.to_string())
    }
}

/// Errors produced while loading plugins.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No plugin with this name is compiled in.
    #[error("unknown plugin '{name}' (available: {})", available.join(", "))]
    UnknownPlugin { name: String, available: Vec<String> },

    /// The plugin's init function failed.
    #[error("plugin '{plugin}' failed to initialize: {source:#}")]
    Init {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    /// A route prefix that cannot be mounted.
    #[error("plugin '{plugin}' has an invalid route path '{path}'")]
    InvalidRoute { plugin: String, path: String },

    /// The plugin's routes overlap routes that are already mounted.
    #[error("plugin '{plugin}' routes conflict with existing routes: {message}")]
    RouteConflict { plugin: String, message: String },
}

/// Plugins compiled into the binary, by name.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, PluginFn>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog of plugins that ship with the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(builtin::event_logger());
        catalog
    }

    /// Adds `plugin`, replacing any plugin with the same name.
    pub fn register(&mut self, plugin: PluginFn) -> &mut Self {
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Turns a source into its init function.
    pub fn resolve(&self, source: PluginSource) -> Result<PluginFn, LoadError> {
        match source {
            PluginSource::Init(plugin) => Ok(plugin),
            PluginSource::Named(name) => {
                self.plugins
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| LoadError::UnknownPlugin {
                        name,
                        available: self.names(),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> PluginFn {
        PluginFn::new(name, |_| Ok(()))
    }

    #[test]
    fn resolves_named_plugins() {
        let mut catalog = PluginCatalog::new();
        catalog.register(noop("welcome")).register(noop("stale"));

        let plugin = catalog.resolve("stale".into()).unwrap();
        assert_eq!(plugin.name(), "stale");
        assert_eq!(catalog.names(), vec!["stale", "welcome"]);
    }

    #[test]
    fn unknown_name_lists_available() {
        let catalog = PluginCatalog::builtin();
        let err = catalog.resolve("sentry".into()).unwrap_err();
        match &err {
            LoadError::UnknownPlugin { name, available } => {
                assert_eq!(name, "sentry");
                assert_eq!(available, &vec![builtin::EVENT_LOGGER.to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains("event-logger"));
    }

    #[test]
    fn init_sources_pass_through() {
        let catalog = PluginCatalog::new();
        let plugin = catalog.resolve(noop("inline").into()).unwrap();
        assert_eq!(plugin.name(), "inline");
    }
}
