//! Transport-neutral commands sent to a device.
//!
//! The state bridge produces [`DeviceCommand`]s; the connection task renders
//! them in the configured [`OutboundFormat`] right before writing.

use std::fmt;
use std::str::FromStr;

use serde_json::json;

use super::color::ColorValue;
use super::packet::Packet;
use crate::error::BridgeError;

/// A command destined for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Change color over `duration_ms`.
    SetColor {
        /// Target color as found in the store.
        color: ColorValue,
        /// Transition duration in milliseconds.
        duration_ms: u16,
    },
    /// Upstream state is unavailable.
    Offline,
    /// Keep-alive.
    Heartbeat,
}

impl DeviceCommand {
    /// Encodes the command as a binary frame.
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        match *self {
            Self::SetColor { color, duration_ms } => Packet::set_hsv(color.to_hsv(), duration_ms),
            Self::Offline => Packet::offline(),
            Self::Heartbeat => Packet::heartbeat(),
        }
    }

    /// Encodes the command as the JSON compatibility envelope.
    ///
    /// SET_COLOR renders as `{"type":"color","data":{"r":..,"g":..,"b":..}}`
    /// (or `{"h","s","v"}` when the store held HSV).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::SetColor { color, duration_ms } if *duration_ms > 0 => json!({
                "type": "color",
                "data": color,
                "durationMs": duration_ms,
            }),
            Self::SetColor { color, .. } => json!({ "type": "color", "data": color }),
            Self::Offline => json!({ "type": "offline" }),
            Self::Heartbeat => json!({ "type": "heartbeat" }),
        }
    }
}

/// Wire representation used for outbound device messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutboundFormat {
    /// 8-byte binary frames.
    #[default]
    Binary,
    /// JSON text envelopes.
    Json,
}

impl FromStr for OutboundFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "bin" => Ok(Self::Binary),
            "json" | "text" => Ok(Self::Json),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown outbound format {other:?} (expected binary or json)"
            ))),
        }
    }
}

impl fmt::Display for OutboundFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Json => f.write_str("json"),
        }
    }
}
