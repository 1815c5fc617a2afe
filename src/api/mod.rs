//! HTTP API layer: health check and admin endpoints.
//!
//! Admin endpoints are mounted under `/api/v1`; `/health` sits at the root.

pub mod dto;
pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete HTTP router (without the WebSocket route).
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
