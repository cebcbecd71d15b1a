//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::RoomId,
    hub::RoomSnapshot,
    infrastructure::dto::http::{HistoryEntryDto, HistoryQuery, RoomDto},
    ui::state::AppState,
};

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Get list of rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RoomDto>>, StatusCode> {
    let rooms = state.hub.rooms().await.map_err(|e| {
        tracing::warn!("Failed to list rooms: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(rooms.into_iter().map(RoomDto::from).collect()))
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDto>, StatusCode> {
    let room = RoomId::new(room_id).map_err(|_| StatusCode::NOT_FOUND)?;

    let members = state
        .hub
        .roster(&room)
        .await
        .map_err(|e| {
            tracing::warn!("Failed to read roster of '{}': {}", room, e);
            StatusCode::SERVICE_UNAVAILABLE
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(RoomDto::from(RoomSnapshot { room, members })))
}

/// Most recent persisted chat messages, newest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntryDto>>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let messages = state.store.recent(limit).await.map_err(|e| {
        tracing::warn!("Failed to load history: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(messages.into_iter().map(HistoryEntryDto::from).collect()))
}
