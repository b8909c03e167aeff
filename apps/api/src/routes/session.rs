//! Session HTTP route handlers
//!
//! - `POST /start` - create a session, returns `{secret, id}`
//! - `PUT /update/:secret` - host playback report
//! - `GET /feed/:id` - viewer WebSocket feed

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::services::SessionCredentials;
use crate::state::AppState;
use crate::websocket::feed_handler;

/// Create session router
pub fn session_router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start_session))
        .route("/update/:secret", put(record_update))
        .route("/feed/:id", get(feed_handler))
        .with_state(state)
}

/// Create a session for a new host
async fn start_session(State(state): State<AppState>) -> ApiResult<Json<SessionCredentials>> {
    let credentials = state.sessions.start().await?;
    Ok(Json(credentials))
}

/// Apply a host playback report
///
/// The body is taken raw so every malformed report, including invalid JSON,
/// gets the same failure envelope.
async fn record_update(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.ingest.apply(&secret, &body).await?;
    Ok(Json(json!({ "status": "ok" })))
}
