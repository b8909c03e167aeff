//! Inflo API library
//!
//! One host broadcasts its playback position and play/pause state; any
//! number of viewers follow along over WebSocket. This crate exposes the
//! synchronization core, the session store backends and the HTTP surface
//! for use by the binary and integration tests.

pub mod config;
pub mod error;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod websocket;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::app_router;
pub use state::AppState;
