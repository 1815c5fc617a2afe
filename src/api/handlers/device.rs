//! Device endpoints: session listing and desired/preview state access.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{DeviceStateResponse, SessionListResponse};
use crate::app_state::AppState;
use crate::bridge::StateAspect;
use crate::domain::DeviceId;
use crate::error::BridgeError;
use crate::session::SessionSummary;
use crate::store::StateStore;

/// `GET /api/v1/sessions` — List connected devices.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list().await;
    let total = sessions.len();
    (StatusCode::OK, Json(SessionListResponse { sessions, total }))
}

/// `GET /api/v1/sessions/{device_id}` — Show one connected device.
///
/// # Errors
///
/// Returns [`BridgeError::NotFound`] if the device is not connected.
pub async fn get_session(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, BridgeError> {
    let session = state
        .registry
        .lookup(&device_id)
        .await
        .ok_or_else(|| not_connected(&device_id))?;
    Ok((
        StatusCode::OK,
        Json(SessionSummary::from(session.as_ref())),
    ))
}

/// `DELETE /api/v1/sessions/{device_id}` — Force a device off.
///
/// # Errors
///
/// Returns [`BridgeError::NotFound`] if the device is not connected.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, BridgeError> {
    if state.registry.disconnect(&device_id).await {
        tracing::info!(%device_id, "session closed by admin request");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_connected(&device_id))
    }
}

/// `GET /api/v1/devices/{device_id}/state/{aspect}` — Read stored state.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidArgument`] for an empty id or unknown
/// aspect, [`BridgeError::NotFound`] when nothing is stored.
pub async fn get_state(
    State(state): State<AppState>,
    Path((device_id, aspect)): Path<(String, String)>,
) -> Result<impl IntoResponse, BridgeError> {
    let path = state_path(&device_id, &aspect)?;
    let value = state
        .store
        .read(&path)
        .await?
        .ok_or_else(|| {
            BridgeError::NotFound(format!("no state stored at {path}"))
        })?;
    Ok((
        StatusCode::OK,
        Json(DeviceStateResponse {
            path,
            value,
            notified: None,
        }),
    ))
}

/// `PUT /api/v1/devices/{device_id}/state/{aspect}` — Write state and
/// notify the connected device, if any.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidArgument`] for an empty id or unknown
/// aspect.
pub async fn put_state(
    State(state): State<AppState>,
    Path((device_id, aspect)): Path<(String, String)>,
    Json(value): Json<serde_json::Value>,
) -> Result<impl IntoResponse, BridgeError> {
    let path = state_path(&device_id, &aspect)?;
    let notified = state.store.set(&path, value.clone()).await;
    tracing::info!(%path, notified, "state written");
    Ok((
        StatusCode::OK,
        Json(DeviceStateResponse {
            path,
            value,
            notified: Some(notified),
        }),
    ))
}

fn not_connected(device_id: &str) -> BridgeError {
    BridgeError::NotFound(format!("device {device_id} is not connected"))
}

fn state_path(device_id: &str, aspect: &str) -> Result<String, BridgeError> {
    let device_id = DeviceId::parse(device_id)?;
    let aspect: StateAspect = aspect.parse()?;
    Ok(aspect.path(&device_id))
}

/// Device routes (nested under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route(
            "/sessions/{device_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/devices/{device_id}/state/{aspect}",
            get(get_state).put(put_state),
        )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::session::SessionTransport;
    use crate::store::MemoryStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use axum::response::Response;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let state = AppState::new(BridgeConfig::default(), Arc::new(MemoryStore::new()));
        let router = crate::api::build_router().with_state(state.clone());
        (router, state)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<&str>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        let Ok(request) = request else {
            panic!("request build failed for {uri}");
        };
        let Ok(response) = router.clone().oneshot(request).await else {
            panic!("request to {uri} failed");
        };
        response
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let Ok(bytes) = to_bytes(response.into_body(), 1 << 20).await else {
            panic!("body read failed");
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    #[tokio::test]
    async fn put_then_get_state() {
        let (router, state) = app();
        let uri = "/api/v1/devices/D1/state/desired";
        let body = r#"{"color":{"r":1,"g":2,"b":3}}"#;
        let response = call(&router, Method::PUT, uri, Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state
            .store
            .read("devices/D1/desiredState")
            .await
            .ok()
            .flatten();
        assert_eq!(
            stored,
            Some(serde_json::json!({"color": {"r": 1, "g": 2, "b": 3}}))
        );

        let response = call(&router, Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["path"], "devices/D1/desiredState");
        assert_eq!(json["value"]["color"]["b"], 3);
    }

    #[tokio::test]
    async fn unknown_aspect_is_bad_request() {
        let (router, _state) = app();
        let response = call(&router, Method::GET, "/api/v1/devices/D1/state/mood", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_state_is_not_found() {
        let (router, _state) = app();
        let uri = "/api/v1/devices/D9/state/preview";
        let response = call(&router, Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_list_starts_empty() {
        let (router, _state) = app();
        let response = call(&router, Method::GET, "/api/v1/sessions", None).await;
        let json = body_json(response).await;
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn session_endpoints_track_registry() {
        let (router, state) = app();
        let (transport, _rx) = SessionTransport::channel(8);
        let Ok(_session) = state.registry.connect("D1", transport).await else {
            panic!("connect failed");
        };

        let response = call(&router, Method::GET, "/api/v1/sessions/D1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["device_id"], "D1");
        assert_eq!(json["state"], "active");

        let response = call(&router, Method::DELETE, "/api/v1/sessions/D1", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.registry.is_empty().await);

        let response = call(&router, Method::DELETE, "/api/v1/sessions/D1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_connections() {
        let (router, _state) = app();
        let response = call(&router, Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["connections"], 0);
    }

    #[tokio::test]
    async fn health_skips_closed_sessions() {
        let (router, state) = app();
        let (transport, _rx) = SessionTransport::channel(8);
        let Ok(session) = state.registry.connect("D1", transport).await else {
            panic!("connect failed");
        };

        let json = body_json(call(&router, Method::GET, "/health", None).await).await;
        assert_eq!(json["connections"], 1);

        session.transport().close();
        let json = body_json(call(&router, Method::GET, "/health", None).await).await;
        assert_eq!(json["connections"], 0);
        let response = call(&router, Method::GET, "/api/v1/sessions/D1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
