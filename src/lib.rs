//! # lumen-bridge
//!
//! WebSocket bridge between embedded light controllers and a key-path state
//! store.
//!
//! Devices hold a persistent WebSocket to the bridge. For every connected
//! device the bridge watches the device's desired (and preview) state in
//! the store, pushes the current color on connect, and forwards every later
//! change as a fixed 8-byte binary frame.
//!
//! ## Architecture
//!
//! ```text
//! Devices (WebSocket)          Operators (HTTP)
//!     │                            │
//!     ├── WS Handler (ws/)         ├── Health / Admin (api/)
//!     │                            │
//!     ├── SessionRegistry (session/) ◄── Liveness Sweeper
//!     │
//!     ├── StateBridge (bridge/)
//!     │
//!     ├── StateStore (store/)
//!     │
//!     └── Wire protocol + color model (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod session;
pub mod store;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the full application router: HTTP API plus the device
/// WebSocket endpoint at `/ws`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
