//! One connected device: its outbound channel, liveness flag, lifecycle
//! state, and attached store subscriptions.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::SubscriptionHandle;
use crate::domain::{DeviceCommand, DeviceId};
use crate::error::BridgeError;

/// Shared reference to a registered session.
pub type SessionRef = Arc<DeviceSession>;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// Created, subscriptions being attached; not yet visible to lookups.
    Connecting = 0,
    /// Registered and routable.
    Active = 1,
    /// Teardown in progress; writes are refused.
    Closing = 2,
    /// Subscriptions detached and map entry released.
    Closed = 3,
}

impl SessionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Items queued for the connection task to write to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// A device command, rendered in the configured format.
    Command(DeviceCommand),
    /// A liveness ping (WebSocket ping).
    Ping,
}

/// Write side of a device connection.
///
/// Cloned into every subscription forwarder. It holds no reference to the
/// session itself, so a forwarder can never keep a torn-down session alive.
#[derive(Debug, Clone)]
pub struct SessionTransport {
    device_id: Option<DeviceId>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl SessionTransport {
    /// Creates a transport handle and the receiver the connection task
    /// drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            device_id: None,
            outbound,
            cancel: CancellationToken::new(),
        };
        (transport, rx)
    }

    /// Queues a command, waiting for channel space.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TransportClosed`] if the transport has been
    /// closed or the connection task has gone away.
    pub async fn send(&self, command: DeviceCommand) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(self.closed_error()),
            sent = self.outbound.send(Outbound::Command(command)) => {
                sent.map_err(|_| self.closed_error())
            }
        }
    }

    /// Queues a command without waiting. Returns `false` if the queue is
    /// full or the transport is closed.
    pub fn offer(&self, command: DeviceCommand) -> bool {
        !self.is_closed() && self.outbound.try_send(Outbound::Command(command)).is_ok()
    }

    /// Queues a liveness ping without waiting. Returns `false` if the
    /// ping could not be queued.
    pub fn ping(&self) -> bool {
        !self.is_closed() && self.outbound.try_send(Outbound::Ping).is_ok()
    }

    /// Signals the connection task to stop and close the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the transport has been closed from either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }

    /// Token cancelled when the transport is closed.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn closed_error(&self) -> BridgeError {
        match &self.device_id {
            Some(id) => BridgeError::TransportClosed(id.clone()),
            None => BridgeError::Internal("transport closed before registration".to_string()),
        }
    }
}

/// The in-memory record of one connected device.
#[derive(Debug)]
pub struct DeviceSession {
    device_id: DeviceId,
    serial: u64,
    transport: SessionTransport,
    alive: AtomicBool,
    state: AtomicU8,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    connected_at: DateTime<Utc>,
}

impl DeviceSession {
    /// Creates a session in the [`SessionState::Connecting`] state.
    #[must_use]
    pub fn new(device_id: DeviceId, serial: u64, mut transport: SessionTransport) -> Self {
        transport.device_id = Some(device_id.clone());
        Self {
            device_id,
            serial,
            transport,
            alive: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Connecting as u8),
            subscriptions: Mutex::new(Vec::new()),
            connected_at: Utc::now(),
        }
    }

    /// Device this session belongs to.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Process-unique number distinguishing reconnects of the same device.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Write side of the connection.
    #[must_use]
    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    /// When the session was created.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` if the session is routable.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Records a liveness acknowledgement.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Returns the liveness flag without changing it.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Clears the liveness flag, returning its previous value.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// `Connecting -> Active`. Returns `false` if the session already left
    /// `Connecting`.
    pub fn activate(&self) -> bool {
        self.transition(SessionState::Connecting, SessionState::Active)
    }

    /// Moves the session into `Closing`. Exactly one caller wins; every
    /// other caller (and every later call) gets `false`.
    pub fn begin_close(&self) -> bool {
        self.transition(SessionState::Active, SessionState::Closing)
            || self.transition(SessionState::Connecting, SessionState::Closing)
    }

    /// `Closing -> Closed`.
    pub fn finish_close(&self) {
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stores the subscription handles attached for this session.
    pub fn install_subscriptions(&self, handles: Vec<SubscriptionHandle>) {
        self.lock_subscriptions().extend(handles);
    }

    /// Removes and returns all subscription handles for detaching.
    pub fn take_subscriptions(&self) -> Vec<SubscriptionHandle> {
        std::mem::take(&mut *self.lock_subscriptions())
    }

    /// Number of subscription handles currently attached.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock_subscriptions().len()
    }

    /// Store paths currently watched for this session.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<String> {
        self.lock_subscriptions()
            .iter()
            .map(|handle| handle.path().to_string())
            .collect()
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionHandle>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time view of a session for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Reconnect-distinguishing serial.
    pub serial: u64,
    /// Lifecycle state.
    pub state: SessionState,
    /// Liveness flag at the time of the snapshot.
    pub alive: bool,
    /// Connect timestamp.
    pub connected_at: DateTime<Utc>,
    /// Watched store paths.
    pub watched_paths: Vec<String>,
}

impl From<&DeviceSession> for SessionSummary {
    fn from(session: &DeviceSession) -> Self {
        Self {
            device_id: session.device_id.clone(),
            serial: session.serial,
            state: session.state(),
            alive: session.is_alive(),
            connected_at: session.connected_at,
            watched_paths: session.watched_paths(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Rgb;

    fn make_session(capacity: usize) -> (DeviceSession, mpsc::Receiver<Outbound>) {
        let Ok(id) = DeviceId::parse("D1") else {
            panic!("valid id");
        };
        let (transport, rx) = SessionTransport::channel(capacity);
        (DeviceSession::new(id, 1, transport), rx)
    }

    fn red() -> DeviceCommand {
        DeviceCommand::SetColor {
            color: Rgb::new(255, 0, 0).into(),
            duration_ms: 0,
        }
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let (session, _rx) = make_session(4);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(!session.is_active());

        assert!(session.activate());
        assert!(session.is_active());
        assert!(!session.activate());

        assert!(session.begin_close());
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.begin_close());
        assert!(!session.activate());

        session.finish_close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.begin_close());
    }

    #[test]
    fn connecting_session_can_close() {
        let (session, _rx) = make_session(4);
        assert!(session.begin_close());
        assert!(!session.activate());
    }

    #[test]
    fn take_alive_clears_flag() {
        let (session, _rx) = make_session(4);
        assert!(!session.take_alive());
        session.mark_alive();
        assert!(session.is_alive());
        assert!(session.take_alive());
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (session, mut rx) = make_session(4);
        let green = DeviceCommand::SetColor {
            color: Rgb::new(0, 255, 0).into(),
            duration_ms: 0,
        };
        assert!(session.transport().send(red()).await.is_ok());
        assert!(session.transport().send(green).await.is_ok());
        assert_eq!(rx.recv().await, Some(Outbound::Command(red())));
        assert_eq!(rx.recv().await, Some(Outbound::Command(green)));
    }

    #[tokio::test]
    async fn send_after_close_is_transport_closed() {
        let (session, _rx) = make_session(4);
        session.transport().close();
        assert!(matches!(
            session.transport().send(red()).await,
            Err(BridgeError::TransportClosed(_))
        ));
        assert!(!session.transport().ping());
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_transport_closed() {
        let (session, rx) = make_session(4);
        drop(rx);
        assert!(session.transport().is_closed());
        assert!(session.transport().send(red()).await.is_err());
    }

    #[tokio::test]
    async fn blocked_send_unblocks_on_close() {
        let (session, _rx) = make_session(1);
        let transport = session.transport().clone();
        assert!(transport.send(red()).await.is_ok());

        let blocked = tokio::spawn({
            let transport = transport.clone();
            async move { transport.send(red()).await }
        });
        tokio::task::yield_now().await;
        transport.close();

        let Ok(result) = blocked.await else {
            panic!("send task panicked");
        };
        assert!(result.is_err());
    }

    #[test]
    fn ping_is_queued() {
        let (session, mut rx) = make_session(4);
        assert!(session.transport().ping());
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Ping));
    }

    #[test]
    fn offer_never_waits_for_space() {
        let (session, mut rx) = make_session(1);
        assert!(session.transport().offer(red()));
        assert!(!session.transport().offer(DeviceCommand::Offline));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Command(red())));
        session.transport().close();
        assert!(!session.transport().offer(red()));
    }

    #[test]
    fn summary_reflects_state() {
        let (session, _rx) = make_session(4);
        session.activate();
        session.mark_alive();
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.device_id.as_str(), "D1");
        assert_eq!(summary.state, SessionState::Active);
        assert!(summary.alive);
        assert!(summary.watched_paths.is_empty());
    }
}
