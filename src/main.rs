mod config;
mod db;
mod models;
mod routes;
mod services;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::IndexStore;
use crate::services::{
    gateway::OffloadGateway,
    m3u_parser::{HttpPlaylistSource, PlaylistSource},
    refresh::RefreshService,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<IndexStore>,
    pub gateway: OffloadGateway,
    pub refresh: RefreshService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, source: Arc<dyn PlaylistSource>) -> Self {
        let store = Arc::new(IndexStore::new(
            config.store_path.clone(),
            config.store_max_connections,
        ));
        let gateway = OffloadGateway::with_thread_worker(
            store.clone(),
            config.store_max_connections,
            config.offload_enabled,
        );
        let refresh = RefreshService::new(source, store.clone());

        Self {
            config,
            store,
            gateway,
            refresh,
            start_time: Instant::now(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playlist_catalog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting Playlist Catalog v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.node_env);

    let source = HttpPlaylistSource::new(
        config.playlist_url.clone(),
        &config.user_agent,
        config.fetch_timeout_ms,
        config.max_retries,
        config.max_m3u_size_mb,
    )
    .context("Failed to create HTTP client")?;
    match &config.playlist_url {
        Some(url) => tracing::info!("Playlist source: {}", url),
        None => tracing::warn!("PLAYLIST_URL not set, refresh will be rejected"),
    }

    // Build application state
    let state = Arc::new(AppState::new(config, Arc::new(source)));

    // Open the store up front so startup logs show its state
    if state.store.is_available().await {
        tracing::info!("Index store ready");
    } else {
        tracing::warn!("Index store unavailable, queries will return empty results");
    }

    let app = routes::build_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
