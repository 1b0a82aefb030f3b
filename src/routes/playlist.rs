use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::StoreError;
use crate::services::m3u_parser::SourceError;
use crate::services::refresh::{RefreshError, RefreshSummary};
use crate::AppState;

/// Refresh status response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    pub store_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<RefreshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn refresh_error_status(error: &RefreshError) -> StatusCode {
    match error {
        RefreshError::AlreadyRunning => StatusCode::CONFLICT,
        RefreshError::Source(SourceError::NotConfigured) => StatusCode::BAD_REQUEST,
        RefreshError::Source(SourceError::MissingHeader) => StatusCode::UNPROCESSABLE_ENTITY,
        RefreshError::Source(_) => StatusCode::BAD_GATEWAY,
        RefreshError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        RefreshError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/playlist/refresh - Fetch, classify and index the configured playlist
pub async fn refresh_playlist(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    match state.refresh.refresh().await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => Err((
            refresh_error_status(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        )),
    }
}

/// GET /api/playlist/status - Last refresh result and store state
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entries = state.store.count().await.ok();

    Json(StatusResponse {
        running: state.refresh.is_running(),
        store_available: entries.is_some(),
        entries,
        last_refresh: state.refresh.last_summary().await,
        last_error: state.refresh.last_error().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_status() {
        assert_eq!(refresh_error_status(&RefreshError::AlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(
            refresh_error_status(&RefreshError::Source(SourceError::NotConfigured)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            refresh_error_status(&RefreshError::Source(SourceError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            refresh_error_status(&RefreshError::Store(StoreError::Unavailable("x".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
