//! Rendering of outbound items and classification of inbound device
//! messages.

use axum::body::Bytes;
use axum::extract::ws::Message;
use serde::Deserialize;

use crate::domain::{DeviceCommand, OutboundFormat, Opcode, Packet, packet};

/// Query parameters accepted on the WebSocket upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectParams {
    /// Device identifier.
    #[serde(rename = "deviceId", alias = "device_id")]
    pub device_id: Option<String>,
}

/// Renders a command in the configured wire format.
#[must_use]
pub fn render_command(command: &DeviceCommand, format: OutboundFormat) -> Message {
    match format {
        OutboundFormat::Binary => {
            Message::Binary(Bytes::copy_from_slice(&command.to_packet().to_bytes()))
        }
        OutboundFormat::Json => Message::text(command.to_json().to_string()),
    }
}

/// Renders a liveness ping. The WebSocket ping always goes out; the
/// HEARTBEAT command follows when `heartbeat_frames` is set.
#[must_use]
pub fn render_ping(format: OutboundFormat, heartbeat_frames: bool) -> Vec<Message> {
    let mut messages = vec![Message::Ping(Bytes::new())];
    if heartbeat_frames {
        messages.push(render_command(&DeviceCommand::Heartbeat, format));
    }
    messages
}

/// What an inbound message means to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Proof of life: a pong, or a HEARTBEAT echoed by the device.
    Ack,
    /// A well-formed frame other than HEARTBEAT.
    Frame(Packet),
    /// A binary message that failed frame validation, with its diagnostic.
    Malformed(String),
    /// Text that is not a recognized envelope.
    Text,
    /// The peer closed the connection.
    Close,
    /// Anything else (ping, which the socket answers by itself).
    Ignored,
}

#[derive(Debug, Deserialize)]
struct TextEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Classifies one inbound message.
#[must_use]
pub fn classify(message: &Message) -> Inbound {
    match message {
        Message::Pong(_) => Inbound::Ack,
        Message::Binary(bytes) => match Packet::decode(bytes) {
            Ok(frame) if frame.opcode() == Opcode::Heartbeat => Inbound::Ack,
            Ok(frame) => Inbound::Frame(frame),
            Err(_) => Inbound::Malformed(packet::describe(bytes)),
        },
        Message::Text(text) => match serde_json::from_str::<TextEnvelope>(text.as_str()) {
            Ok(envelope) if matches!(envelope.kind.as_str(), "heartbeat" | "pong") => Inbound::Ack,
            _ => Inbound::Text,
        },
        Message::Close(_) => Inbound::Close,
        Message::Ping(_) => Inbound::Ignored,
    }
}
