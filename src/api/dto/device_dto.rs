//! DTOs for the health and device endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionSummary;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Number of routable device sessions.
    pub connections: usize,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

/// Response of `GET /api/v1/sessions`.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    /// Active sessions, ordered by device id.
    pub sessions: Vec<SessionSummary>,
    /// Number of entries in `sessions`.
    pub total: usize,
}

/// Response of the device state endpoints.
#[derive(Debug, Serialize)]
pub struct DeviceStateResponse {
    /// Store path the value lives at.
    pub path: String,
    /// Stored value.
    pub value: serde_json::Value,
    /// Listeners notified by a write (absent on reads).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified: Option<usize>,
}
