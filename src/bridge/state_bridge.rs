//! Attaches store listeners to device sessions and forwards changes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::aspect::StateAspect;
use super::subscription::SubscriptionHandle;
use crate::domain::{DeviceCommand, DeviceId};
use crate::error::BridgeError;
use crate::session::{DeviceSession, SessionTransport};
use crate::store::{StateStore, StoreListener};

/// Per-session adapter between the state store and a device transport.
///
/// Each watched aspect gets its own listener and its own forwarding task.
/// A single task per path keeps that path's changes in store order; paths
/// are never merged.
#[derive(Debug, Clone)]
pub struct StateBridge {
    store: Arc<dyn StateStore>,
    aspects: Vec<StateAspect>,
    detach_timeout: Duration,
}

impl StateBridge {
    /// Creates a bridge watching `aspects` on `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        aspects: Vec<StateAspect>,
        detach_timeout: Duration,
    ) -> Self {
        Self {
            store,
            aspects,
            detach_timeout,
        }
    }

    /// Attaches one listener per aspect for `session`.
    ///
    /// For each aspect the listener is registered first and the current
    /// value read second, so no write can fall between the snapshot and the
    /// live stream. Changes already queued by then supersede the snapshot:
    /// only the newest of them is kept. The forwarding task pushes that
    /// value before any later change (a reconnecting device returns to its
    /// last commanded color).
    ///
    /// Never waits on the outbound queue, so a connection task that has not
    /// started draining yet cannot stall registration.
    ///
    /// An aspect whose listener cannot be registered, or whose snapshot
    /// cannot be read, is reported to the device as offline.
    pub async fn attach(&self, session: &DeviceSession) -> Vec<SubscriptionHandle> {
        let device_id = session.device_id();
        let transport = session.transport();
        let mut handles = Vec::with_capacity(self.aspects.len());

        for &aspect in &self.aspects {
            let path = aspect.path(device_id);
            let mut listener = match self.store.subscribe(&path).await {
                Ok(listener) => listener,
                Err(err) => {
                    warn!(%device_id, %path, error = %err, "failed to subscribe to state path");
                    if !transport.offer(DeviceCommand::Offline) {
                        debug!(%device_id, %path, "offline notice not queued");
                    }
                    continue;
                }
            };

            let mut snapshot = self.store.read(&path).await;
            while let Ok(newer) = listener.changes.try_recv() {
                snapshot = Ok(Some(newer));
            }
            let initial = match snapshot {
                Ok(Some(value)) => Some(Initial::Value(value)),
                Ok(None) => None,
                Err(err) => {
                    warn!(%device_id, %path, error = %err, "initial state read failed");
                    Some(Initial::Offline)
                }
            };

            let id = listener.id;
            let forwarder = tokio::spawn(forward_changes(
                aspect,
                transport.clone(),
                device_id.clone(),
                initial,
                listener,
            ));
            debug!(%device_id, %path, listener = %id, "subscription attached");
            handles.push(SubscriptionHandle::new(aspect, path, id, forwarder));
        }

        handles
    }

    /// Detaches every handle, bounded by the configured timeout each.
    ///
    /// Failures are logged and otherwise ignored: teardown always completes.
    /// Returns the number of handles that detached cleanly.
    pub async fn detach_all(&self, device_id: &DeviceId, handles: &[SubscriptionHandle]) -> usize {
        let mut clean = 0;
        for handle in handles {
            let aspect = handle.aspect();
            let listener = handle.listener();
            match handle.detach(self.store.as_ref(), self.detach_timeout).await {
                Ok(()) => {
                    debug!(%device_id, %aspect, %listener, "subscription detached");
                    clean += 1;
                }
                Err(err) => {
                    warn!(
                        %device_id,
                        %aspect,
                        %listener,
                        error = %err,
                        "subscription detach failed; abandoning listener"
                    );
                }
            }
        }
        clean
    }
}

/// What a forwarder pushes before its first live change.
#[derive(Debug)]
enum Initial {
    Value(Value),
    Offline,
}

/// Forwarding loop for one subscription. Ends when the listener is
/// dropped by the store or the transport closes.
async fn forward_changes(
    aspect: StateAspect,
    transport: SessionTransport,
    device_id: DeviceId,
    initial: Option<Initial>,
    mut listener: StoreListener,
) {
    let pushed = match initial {
        Some(initial) => push_initial(aspect, &transport, &device_id, initial)
            .await
            .is_ok(),
        None => true,
    };
    if !pushed {
        return;
    }

    while let Some(value) = listener.changes.recv().await {
        if deliver(aspect, &transport, &device_id, &value).await.is_err() {
            break;
        }
    }
}

/// Queues the value captured at attach time.
async fn push_initial(
    aspect: StateAspect,
    transport: &SessionTransport,
    device_id: &DeviceId,
    initial: Initial,
) -> Result<(), BridgeError> {
    match initial {
        Initial::Value(value) => {
            if deliver(aspect, transport, device_id, &value).await? {
                info!(%device_id, %aspect, "restored last known state");
            }
            Ok(())
        }
        Initial::Offline => transport.send(DeviceCommand::Offline).await,
    }
}

/// Translates and queues one value. Returns `Ok(false)` when the value
/// carried no usable color; only a closed transport is an error.
async fn deliver(
    aspect: StateAspect,
    transport: &SessionTransport,
    device_id: &DeviceId,
    value: &Value,
) -> Result<bool, BridgeError> {
    let Some(command) = aspect.translate(value) else {
        debug!(%device_id, %aspect, "ignoring value without a usable color");
        return Ok(false);
    };
    transport.send(command).await.inspect_err(|_| {
        debug!(%device_id, %aspect, "transport closed; dropping state change");
    })?;
    Ok(true)
}
