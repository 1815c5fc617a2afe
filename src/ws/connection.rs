//! WebSocket connection loop for one device.
//!
//! Registers the device, then multiplexes inbound socket messages, the
//! session's outbound queue, and the session's cancellation token until one
//! side closes. The close path always runs the registry teardown for this
//! exact session before the socket is released.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::messages::{Inbound, classify, render_command, render_ping};
use crate::app_state::AppState;
use crate::domain::DeviceId;
use crate::session::{Outbound, SessionTransport};

type WsSink = SplitSink<WebSocket, Message>;

/// Runs the read/write loop for a single device connection.
pub async fn run_connection(mut socket: WebSocket, device_id: DeviceId, state: AppState) {
    let config = &state.config;
    let (transport, mut outbound_rx) = SessionTransport::channel(config.outbound_channel_capacity);
    let cancel = transport.cancellation();

    let session = match state.registry.connect(device_id.as_str(), transport).await {
        Ok(session) => session,
        Err(err) => {
            warn!(%device_id, error = %err, "rejecting device connection");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: err.to_string().into(),
            };
            let _ = tokio::time::timeout(
                config.close_timeout,
                socket.send(Message::Close(Some(frame))),
            )
            .await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(%device_id, "transport cancelled");
                break;
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else {
                    break;
                };
                match classify(&msg) {
                    Inbound::Ack => session.mark_alive(),
                    Inbound::Frame(frame) => debug!(%device_id, %frame, "inbound frame"),
                    Inbound::Malformed(diagnostic) => {
                        warn!(%device_id, frame = %diagnostic, "discarding malformed frame");
                    }
                    Inbound::Text => debug!(%device_id, "ignoring text message"),
                    Inbound::Close => break,
                    Inbound::Ignored => {}
                }
            }
            out = outbound_rx.recv() => {
                let Some(out) = out else {
                    break;
                };
                let format = config.outbound_format;
                let messages = match out {
                    Outbound::Command(command) => vec![render_command(&command, format)],
                    Outbound::Ping => render_ping(format, config.heartbeat_frames),
                };
                if write_all(&mut ws_tx, messages, config.close_timeout).await.is_err() {
                    debug!(%device_id, "socket write failed");
                    break;
                }
            }
        }
    }

    state.registry.disconnect_session(&session).await;

    if tokio::time::timeout(config.close_timeout, ws_tx.close())
        .await
        .is_err()
    {
        warn!(%device_id, "socket close timed out; abandoning");
    }
    info!(%device_id, serial = session.serial(), "connection closed");
}

/// Writes each message under the given per-write timeout.
async fn write_all(sink: &mut WsSink, messages: Vec<Message>, timeout: Duration) -> Result<(), ()> {
    for message in messages {
        match tokio::time::timeout(timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => return Err(()),
        }
    }
    Ok(())
}
