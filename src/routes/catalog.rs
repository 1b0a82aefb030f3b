use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::db::StoreError;
use crate::models::{EntriesResponse, GroupsQuery, GroupsResponse, ItemsQuery, Outcome, SearchQuery};
use crate::services::query_engine::{QueryError, DEFAULT_GROUP_LIMIT, DEFAULT_TITLE_LIMIT};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn query_error(e: QueryError) -> ApiError {
    tracing::error!("Query failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

/// Anything but a clean in-worker result is flagged
fn is_degraded<T>(outcome: &Outcome<T>) -> bool {
    !matches!(outcome, Outcome::Ok(_))
}

fn entries_response(
    outcome: Outcome<Vec<crate::models::Entry>>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> EntriesResponse {
    let degraded = is_degraded(&outcome);
    let items = outcome.into_inner();
    EntriesResponse {
        total: items.len(),
        items,
        offset,
        limit,
        degraded,
    }
}

fn groups_response(outcome: Outcome<Vec<String>>) -> GroupsResponse {
    let degraded = is_degraded(&outcome);
    let groups = outcome.into_inner();
    GroupsResponse {
        total: groups.len(),
        groups,
        degraded,
    }
}

/// GET /api/search?q=&limit= - Title substring search
pub async fn search_titles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TITLE_LIMIT)
        .min(state.config.max_items_page);

    let outcome = state
        .gateway
        .search_by_title(&params.q, limit)
        .await
        .map_err(query_error)?;

    Ok(Json(entries_response(outcome, None, Some(limit))))
}

/// GET /api/search/group?q=&limit= - Group title substring search
pub async fn search_groups(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_GROUP_LIMIT)
        .min(state.config.max_items_page);

    let outcome = state
        .gateway
        .search_by_group_title(&params.q, limit)
        .await
        .map_err(query_error)?;

    Ok(Json(entries_response(outcome, None, Some(limit))))
}

/// GET /api/items?q=&offset=&limit=&filter=&groups= - Paged listing
pub async fn get_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ItemsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.min(state.config.max_items_page);

    let outcome = state
        .gateway
        .search_by_title_paged(&params.q, params.offset, limit, params.filter, params.group_list())
        .await
        .map_err(query_error)?;

    Ok(Json(entries_response(outcome, Some(params.offset), Some(limit))))
}

/// GET /api/entries - Every stored entry
pub async fn get_entries(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.gateway.get_all().await.map_err(query_error)?;
    Ok(Json(entries_response(outcome, None, None)))
}

/// GET /api/entries/:title - One entry by title (exact, then case-insensitive)
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.gateway.get_by_title(&title).await.map_err(query_error)?;
    let degraded = is_degraded(&outcome);

    match outcome.value().flatten() {
        Some(entry) => Ok(Json(serde_json::json!({
            "entry": entry,
            "degraded": degraded,
        }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Entry not found" })),
        )),
    }
}

/// GET /api/groups?filter= - Distinct groups for a type filter
pub async fn get_groups(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GroupsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.gateway.get_groups(params.filter).await.map_err(query_error)?;
    Ok(Json(groups_response(outcome)))
}

/// GET /api/groups/all - Every distinct group
pub async fn get_all_groups(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.gateway.get_all_groups().await.map_err(query_error)?;
    Ok(Json(groups_response(outcome)))
}

/// POST /api/index/upsert - Bulk upsert of loosely-typed entries
pub async fn upsert_entries(
    State(state): State<Arc<AppState>>,
    Json(values): Json<Vec<serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.bulk_upsert_values(values).await {
        Ok(report) => {
            crate::services::metrics::UPSERTED_ENTRIES_TOTAL.inc_by(report.written as u64);
            Ok(Json(report))
        }
        Err(e @ StoreError::Unavailable(_)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )),
        Err(e) => {
            tracing::error!("Bulk upsert failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            ))
        }
    }
}
