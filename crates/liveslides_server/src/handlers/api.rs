use crate::hub::Hub;
use crate::netsync::SyncEngine;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use liveslides_core::replication::{SyncConnectionState, SyncMode};
use liveslides_core::session::parse_session_id;
use serde::Serialize;
use std::sync::Arc;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<Hub>,
    pub sync: Arc<SyncEngine>,
}

/// Server status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub active_connections: usize,
    pub active_sessions: usize,
    pub sync_mode: SyncMode,
    pub sync: SyncConnectionState,
}

/// Create API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{session_id}", get(get_session))
        .with_state(state)
}

/// GET /api/status - Hub and network sync health
async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.hub.stats().await;

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: stats.active_connections,
        active_sessions: stats.active_sessions,
        sync_mode: state.sync.settings().await.mode,
        sync: state.sync.connection_state().await,
    })
}

/// GET /api/sessions - Snapshot of every live session
async fn list_sessions(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.hub.sessions().await)
}

/// GET /api/sessions/{session_id} - Snapshot of one session
async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.hub.session(id).await {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Session not found" })),
        )
            .into_response(),
    }
}
