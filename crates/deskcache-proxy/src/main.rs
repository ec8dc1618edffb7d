//! deskcache proxy - caching interception proxy
//!
//! Serves the application's assets cache-first and its API network-first,
//! so a client keeps working from stored copies while the origin is away.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deskcache_proxy::server::{start_server, ServerState};
use deskcache_proxy::{DiskCacheStorage, HttpUpstream, InterceptionProxy, ProxyConfig, RoutePolicy};

/// Log file name prefix inside `DESKCACHE_LOG_DIR`
const LOG_FILE_PREFIX: &str = "deskcache-proxy.log";

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr, and additionally to a daily rolling file when
/// `DESKCACHE_LOG_DIR` is set. The returned guard must outlive logging.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("DESKCACHE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("deskcache proxy starting");

    let config = ProxyConfig::from_env()?;
    info!(
        port = config.port,
        upstream = %config.upstream,
        version = %config.version,
        cache_dir = ?config.cache_dir,
        "Configuration loaded"
    );

    let storage = DiskCacheStorage::new(config.cache_dir.clone());
    storage
        .init()
        .await
        .context("Failed to create proxy cache directory")?;
    let upstream = HttpUpstream::new(config.timeout())?;

    let proxy = InterceptionProxy::new(
        Arc::new(storage),
        Arc::new(upstream),
        config.version.clone(),
        config.upstream_url()?,
    )
    .with_policy(RoutePolicy::new(config.api_prefixes.clone()))
    .with_precache(config.precache.clone());

    // A failed install leaves older generations in place for a later start
    match proxy.install().await {
        Ok(_) => {
            let deleted = proxy
                .activate()
                .await
                .context("Failed to clean up stale cache generations")?;
            info!(deleted = deleted.len(), "Cache generation activated");
        }
        Err(e) => warn!(error = %e, "Precache failed, assets will be cached on first use"),
    }

    start_server(Arc::new(ServerState::new(proxy)), config.port)
        .await
        .context("Proxy server error")?;

    Ok(())
}
