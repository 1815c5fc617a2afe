//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;

use super::connection::run_connection;
use super::messages::ConnectParams;
use crate::app_state::AppState;
use crate::domain::DeviceId;
use crate::error::BridgeError;

/// `GET /ws?deviceId=<id>` — Upgrade a device connection to WebSocket.
///
/// A missing or empty identifier is refused before the upgrade, so no
/// session is ever created for it.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidArgument`] (HTTP 400) when `deviceId` is
/// missing or empty.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, BridgeError> {
    let device_id = DeviceId::parse(params.device_id.as_deref().unwrap_or_default())?;
    Ok(ws.on_upgrade(move |socket| {
        run_connection(socket, device_id, state)
    }))
}
