//! Room listing and server-mode/environment hint endpoints (spec §6.3).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use sync_player_proto::PublicRoomSummary;

use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{code}", get(room_summary))
        .route("/api/server-mode", get(server_mode))
        .route("/api/vpn-check", get(vpn_check))
}

async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    if !state.config.server_mode {
        return Json(Vec::<PublicRoomSummary>::new()).into_response();
    }

    let mut summaries = Vec::new();
    for handle in state.registry.all() {
        if let Some(summary) = handle.public_summary().await {
            if !summary.is_private {
                summaries.push(summary);
            }
        }
    }
    Json(summaries).into_response()
}

async fn room_summary(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    let Some(handle) = state.registry.get(&code) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "room not found"}))).into_response();
    };
    match handle.public_summary().await {
        Some(summary) => Json(summary).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "room not found"}))).into_response(),
    }
}

async fn server_mode(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "serverMode": state.config.server_mode }))
}

async fn vpn_check() -> impl IntoResponse {
    Json(json!({ "vpnLikely": false }))
}
