//! HTTP route handlers for the Inflo API
//!
//! - Session endpoints (start, update, viewer feed)
//! - Health check endpoints

pub mod health;
pub mod session;

pub use health::{health_router, HealthState};
pub use session::session_router;

use axum::{routing::get, Router};

use crate::state::AppState;

/// All routes, without transport layers (tracing, CORS)
pub fn app_router(state: AppState) -> Router {
    let health_state = HealthState::new(state.store.clone());

    Router::new()
        .route("/", get(root))
        .nest("/health", health_router(health_state))
        .merge(session_router(state))
}

async fn root() -> &'static str {
    "Inflo playback sharing"
}
