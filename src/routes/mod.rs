pub mod catalog;
pub mod health;
pub mod playlist;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        // Playlist refresh
        .route("/api/playlist/refresh", post(playlist::refresh_playlist))
        .route("/api/playlist/status", get(playlist::get_status))
        // Index writes
        .route("/api/index/upsert", post(catalog::upsert_entries))
        // Catalog queries
        .route("/api/entries", get(catalog::get_entries))
        .route("/api/entries/:title", get(catalog::get_entry))
        .route("/api/search", get(catalog::search_titles))
        .route("/api/search/group", get(catalog::search_groups))
        .route("/api/items", get(catalog::get_items))
        .route("/api/groups", get(catalog::get_groups))
        .route("/api/groups/all", get(catalog::get_all_groups))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
