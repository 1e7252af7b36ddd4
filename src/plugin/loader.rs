use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use super::{LoadError, PluginCatalog, PluginSource};
use crate::auth::GitHubApp;
use crate::dispatch::Dispatcher;
use crate::robot::{Robot, panic_message};

/// Loads plugins at startup and collects what they register.
///
/// Loading is one-shot: once [`PluginLoader::finish`] is called the robots
/// are frozen and handed to a [`Dispatcher`].
pub struct PluginLoader {
    app: GitHubApp,
    catalog: PluginCatalog,
    robots: Vec<Arc<Robot>>,
    router: Router,
    reserved: Router,
}

impl PluginLoader {
    pub fn new(app: GitHubApp, catalog: PluginCatalog) -> Self {
        Self {
            app,
            catalog,
            robots: Vec::new(),
            router: Router::new(),
            reserved: Router::new(),
        }
    }

    /// Routes owned by the server itself. Plugin routes that overlap them
    /// are rejected at load time instead of when the server router is built.
    pub fn with_reserved(mut self, routes: Router) -> Self {
        self.reserved = routes;
        self
    }

    /// Resolves `source`, runs its init function against a fresh robot,
    /// mounts its routes and registers it for dispatch.
    pub fn load(&mut self, source: impl Into<PluginSource>) -> Result<Arc<Robot>, LoadError> {
        let plugin = self.catalog.resolve(source.into())?;
        let mut robot = Robot::new(plugin.name(), self.app.clone());

        plugin.init(&mut robot).map_err(|source| LoadError::Init {
            plugin: plugin.name().to_string(),
            source,
        })?;

        for (path, routes) in robot.take_routes() {
            self.mount(plugin.name(), &path, routes)?;
        }

        info!(
            plugin = plugin.name(),
            handlers = robot.handler_count(),
            "Loaded plugin"
        );

        let robot = Arc::new(robot);
        self.robots.push(Arc::clone(&robot));
        Ok(robot)
    }

    /// Loads every source in order, stopping at the first failure.
    pub fn load_all<I, S>(&mut self, sources: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<PluginSource>,
    {
        for source in sources {
            self.load(source)?;
        }
        Ok(())
    }

    /// Nests `routes` at `path`, or merges them when `path` is the root.
    fn mount(&mut self, plugin: &str, path: &str, routes: Router) -> Result<(), LoadError> {
        let prefix = path.trim_end_matches('/');
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.contains(['*', '{', '}'])) {
            return Err(LoadError::InvalidRoute {
                plugin: plugin.to_string(),
                path: path.to_string(),
            });
        }

        // axum reports overlapping routes by panicking.
        let current = self.router.clone();
        let reserved = self.reserved.clone();
        let mounted = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let routes = if prefix.is_empty() {
                routes
            } else {
                Router::new().nest(prefix, routes)
            };
            let _ = reserved.merge(routes.clone());
            current.merge(routes)
        }));

        match mounted {
            Ok(router) => {
                self.router = router;
                Ok(())
            }
            Err(panic) => Err(LoadError::RouteConflict {
                plugin: plugin.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    pub fn robots(&self) -> &[Arc<Robot>] {
        &self.robots
    }

    /// Freezes the loaded plugins into a dispatcher and the router holding
    /// their routes.
    pub fn finish(self) -> (Dispatcher, Router) {
        (Dispatcher::new(self.robots), self.router)
    }
}
