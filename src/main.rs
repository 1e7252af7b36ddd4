use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use octorobot::auth::GitHubApp;
use octorobot::config::AppConfig;
use octorobot::github::{ClientConfig, OctocrabTransport, Transport};
use octorobot::plugin::{PluginCatalog, PluginLoader, builtin};
use octorobot::server::{self, AppState};
use octorobot::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    logging::init(config.log_level, config.log_format)
        .context("failed to install the tracing subscriber")?;
    logging::install_panic_hook();

    let credential = config.credential()?;
    let transport: Arc<dyn Transport> = match config.api_base_uri() {
        Some(base_uri) => Arc::new(OctocrabTransport::with_base_uri(&base_uri)?),
        None => Arc::new(OctocrabTransport::github_com()?),
    };
    let app = GitHubApp::new(credential, transport, ClientConfig::default());

    let plugins = if config.plugins.is_empty() {
        warn!("PLUGINS is empty, loading {}", builtin::EVENT_LOGGER);
        vec![builtin::EVENT_LOGGER.to_string()]
    } else {
        config.plugins.clone()
    };
    let mut loader = PluginLoader::new(app.clone(), PluginCatalog::builtin())
        .with_reserved(server::reserved_routes(&config.webhook_path));
    for name in &plugins {
        loader.load(name.as_str())?;
    }
    let (dispatcher, plugin_routes) = loader.finish();

    let state = AppState::new(dispatcher, config.webhook_secret.clone());
    let router = server::build_router(state, &config.webhook_path, plugin_routes);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
        signal.cancel();
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        app_id = %app.app_id(),
        webhook_path = %config.webhook_path,
        plugins = ?plugins,
        "Started"
    );

    server::serve(listener, router, shutdown).await?;
    Ok(())
}
