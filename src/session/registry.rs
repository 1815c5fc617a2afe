//! Registry of live device sessions.
//!
//! [`SessionRegistry`] maps device identifiers to [`DeviceSession`]s behind a
//! single [`tokio::sync::RwLock`]. Every structural change (insert, replace,
//! remove) takes the write lock; the lock is never held across store or
//! network I/O. Removal is identity-checked, so tearing down a stale session
//! can never evict the session that replaced it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::device_session::{DeviceSession, SessionRef, SessionSummary, SessionTransport};
use crate::bridge::StateBridge;
use crate::domain::DeviceId;
use crate::error::BridgeError;

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that were pinged and get one more period to answer.
    pub pinged: usize,
    /// Sessions whose transport was force-terminated.
    pub evicted: usize,
}

/// Central store for all connected devices.
///
/// # Concurrency
///
/// - `lookup` takes the read lock and only returns `Active` sessions, so a
///   half-built session is never routable.
/// - `connect` attaches subscriptions before taking the write lock, then
///   inserts and activates in one critical section.
/// - Teardown is won by exactly one caller through the session's
///   `Active -> Closing` compare-and-swap.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DeviceId, SessionRef>>,
    bridge: StateBridge,
    next_serial: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry that attaches subscriptions through
    /// `bridge`.
    #[must_use]
    pub fn new(bridge: StateBridge) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            bridge,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Registers a newly connected device.
    ///
    /// Any session already registered under the same identifier is replaced
    /// and torn down: a reconnect means the old transport is stale.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if `device_id` is empty. The
    /// caller must close the transport; nothing is registered.
    pub async fn connect(
        &self,
        device_id: &str,
        transport: SessionTransport,
    ) -> Result<SessionRef, BridgeError> {
        let device_id = DeviceId::parse(device_id)?;
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(DeviceSession::new(device_id.clone(), serial, transport));

        let handles = self.bridge.attach(&session).await;
        session.install_subscriptions(handles);

        let previous = {
            let mut map = self.sessions.write().await;
            session.mark_alive();
            session.activate();
            map.insert(device_id.clone(), Arc::clone(&session))
        };

        info!(%device_id, serial, subscriptions = session.subscription_count(), "device connected");

        if let Some(stale) = previous {
            info!(%device_id, old_serial = stale.serial(), "replacing stale session");
            self.teardown(&stale).await;
        }

        Ok(session)
    }

    /// Returns the active session for `device_id`, if any.
    ///
    /// A session whose transport is already closed (for instance by the
    /// sweeper) is not routable, even before its teardown has run.
    pub async fn lookup(&self, device_id: &str) -> Option<SessionRef> {
        let map = self.sessions.read().await;
        map.get(device_id)
            .filter(|session| is_routable(session))
            .map(Arc::clone)
    }

    /// Tears down whichever session is registered under `device_id`.
    ///
    /// Idempotent: returns `false` if no session was registered or another
    /// caller is already tearing it down.
    pub async fn disconnect(&self, device_id: &str) -> bool {
        let session = {
            let map = self.sessions.read().await;
            map.get(device_id).map(Arc::clone)
        };
        match session {
            Some(session) => self.teardown(&session).await,
            None => false,
        }
    }

    /// Tears down exactly `session`, used by a connection task when its own
    /// transport closes. A newer session under the same identifier is left
    /// alone.
    pub async fn disconnect_session(&self, session: &SessionRef) -> bool {
        self.teardown(session).await
    }

    /// Records a liveness acknowledgement for `device_id`.
    ///
    /// Returns `false` if no active session is registered.
    pub async fn mark_alive(&self, device_id: &str) -> bool {
        match self.lookup(device_id).await {
            Some(session) => {
                session.mark_alive();
                true
            }
            None => false,
        }
    }

    /// Runs one liveness pass over a snapshot of the registered sessions.
    ///
    /// A session that has not acknowledged since the previous pass has its
    /// transport force-terminated; the connection task's close path then
    /// calls [`Self::disconnect_session`]. Every other session has its flag
    /// cleared and is pinged.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for session in self.snapshot().await {
            if !session.is_active() {
                continue;
            }
            if session.take_alive() {
                if !session.transport().ping() {
                    debug!(device_id = %session.device_id(), "liveness ping not queued");
                }
                report.pinged += 1;
            } else {
                info!(
                    device_id = %session.device_id(),
                    serial = session.serial(),
                    "evicting unresponsive device"
                );
                session.transport().close();
                report.evicted += 1;
            }
        }
        report
    }

    /// Clones the current set of registered sessions.
    pub async fn snapshot(&self) -> Vec<SessionRef> {
        self.sessions.read().await.values().map(Arc::clone).collect()
    }

    /// Returns summaries of all routable sessions, ordered by device id.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .snapshot()
            .await
            .iter()
            .filter(|session| is_routable(session))
            .map(|session| SessionSummary::from(session.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        summaries
    }

    /// Returns the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the number of routable sessions: active, with an open
    /// transport.
    pub async fn active_len(&self) -> usize {
        let map = self.sessions.read().await;
        map.values().filter(|session| is_routable(session)).count()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// `Closing -> Closed` for one session: stop writes, detach every
    /// subscription, then release the map entry if it still points at this
    /// session.
    async fn teardown(&self, session: &SessionRef) -> bool {
        if !session.begin_close() {
            return false;
        }
        let device_id = session.device_id();

        session.transport().close();
        let handles = session.take_subscriptions();
        let clean = self.bridge.detach_all(device_id, &handles).await;

        {
            let mut map = self.sessions.write().await;
            if map
                .get(device_id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                map.remove(device_id);
            }
        }
        session.finish_close();

        info!(
            %device_id,
            serial = session.serial(),
            detached = clean,
            abandoned = handles.len() - clean,
            "device disconnected"
        );
        true
    }
}

fn is_routable(session: &DeviceSession) -> bool {
    session.is_active() && !session.transport().is_closed()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::bridge::StateAspect;
    use crate::session::{Outbound, SessionState};
    use crate::store::{MemoryStore, StateStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn make_registry() -> (SessionRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn StateStore> = Arc::clone(&store) as Arc<dyn StateStore>;
        let bridge = StateBridge::new(
            dyn_store,
            StateAspect::ALL.to_vec(),
            Duration::from_millis(200),
        );
        (SessionRegistry::new(bridge), store)
    }

    async fn connect(
        registry: &SessionRegistry,
        id: &str,
    ) -> (SessionRef, mpsc::Receiver<Outbound>) {
        let (transport, rx) = SessionTransport::channel(16);
        let Ok(session) = registry.connect(id, transport).await else {
            panic!("connect {id} failed");
        };
        (session, rx)
    }

    #[tokio::test]
    async fn connect_and_lookup() {
        let (registry, store) = make_registry();
        let (session, _rx) = connect(&registry, "D1").await;

        assert!(session.is_active());
        assert!(session.is_alive());
        assert_eq!(session.subscription_count(), 2);
        assert_eq!(store.total_listeners().await, 2);

        let Some(found) = registry.lookup("D1").await else {
            panic!("session not found");
        };
        assert!(Arc::ptr_eq(&found, &session));
        assert!(registry.lookup("D2").await.is_none());
    }

    #[tokio::test]
    async fn empty_id_is_rejected_and_not_registered() {
        let (registry, store) = make_registry();
        let (transport, _rx) = SessionTransport::channel(4);
        assert!(matches!(
            registry.connect("", transport).await,
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(registry.is_empty().await);
        assert_eq!(store.total_listeners().await, 0);
    }

    #[tokio::test]
    async fn disconnect_detaches_and_removes() {
        let (registry, store) = make_registry();
        let (session, _rx) = connect(&registry, "D1").await;

        assert!(registry.disconnect("D1").await);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.subscription_count(), 0);
        assert!(session.transport().is_closed());
        assert!(registry.lookup("D1").await.is_none());
        assert!(registry.is_empty().await);
        assert_eq!(store.total_listeners().await, 0);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (registry, _store) = make_registry();
        let (session, _rx) = connect(&registry, "D1").await;

        assert!(registry.disconnect("D1").await);
        assert!(!registry.disconnect("D1").await);
        assert!(!registry.disconnect_session(&session).await);
        assert!(!registry.disconnect("never-connected").await);
    }

    #[tokio::test]
    async fn concurrent_teardown_has_one_winner() {
        let (registry, _store) = make_registry();
        let registry = Arc::new(registry);
        let (session, _rx) = connect(&registry, "D1").await;

        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.disconnect("D1").await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            let session = Arc::clone(&session);
            async move { registry.disconnect_session(&session).await }
        });
        let (Ok(a), Ok(b)) = (a.await, b.await) else {
            panic!("teardown task panicked");
        };
        assert!(a ^ b, "exactly one teardown must win (a={a}, b={b})");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn reconnect_replaces_and_detaches_old_session() {
        let (registry, store) = make_registry();
        let (old, mut old_rx) = connect(&registry, "D1").await;
        let (new, mut new_rx) = connect(&registry, "D1").await;

        assert_eq!(old.state(), SessionState::Closed);
        assert!(old.transport().is_closed());
        assert_eq!(registry.len().await, 1);
        assert_eq!(store.total_listeners().await, 2);

        let Some(found) = registry.lookup("D1").await else {
            panic!("new session not registered");
        };
        assert!(Arc::ptr_eq(&found, &new));

        let color = json!({"color": {"r": 0, "g": 0, "b": 255}});
        store.set("devices/D1/desiredState", color).await;
        let Ok(Some(Outbound::Command(_))) =
            tokio::time::timeout(Duration::from_secs(1), new_rx.recv()).await
        else {
            panic!("new session did not receive the change");
        };
        assert!(old_rx.try_recv().is_err());

        // the stale connection closing late must not evict the new session
        assert!(!registry.disconnect_session(&old).await);
        assert!(registry.lookup("D1").await.is_some());
    }

    #[tokio::test]
    async fn sweep_pings_then_evicts() {
        let (registry, _store) = make_registry();
        let (session, mut rx) = connect(&registry, "D1").await;

        let first = registry.sweep().await;
        assert_eq!(first, SweepReport { pinged: 1, evicted: 0 });
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Ping));
        assert!(!session.transport().is_closed());

        let second = registry.sweep().await;
        assert_eq!(second, SweepReport { pinged: 0, evicted: 1 });
        assert!(session.transport().is_closed());
    }

    #[tokio::test]
    async fn evicted_session_is_not_routable_before_teardown() {
        let (registry, store) = make_registry();
        let (session, _rx) = connect(&registry, "D1").await;
        assert_eq!(registry.active_len().await, 1);

        registry.sweep().await;
        registry.sweep().await;
        assert!(session.transport().is_closed());
        assert_eq!(session.state(), SessionState::Active);

        assert!(registry.lookup("D1").await.is_none());
        assert!(!registry.mark_alive("D1").await);
        assert_eq!(registry.active_len().await, 0);
        assert_eq!(registry.len().await, 1);
        assert!(registry.list().await.is_empty());

        assert!(registry.disconnect_session(&session).await);
        assert!(registry.is_empty().await);
        assert_eq!(store.total_listeners().await, 0);
    }

    #[tokio::test]
    async fn connect_with_full_queue_restores_every_path() {
        let (registry, store) = make_registry();
        let color = json!({"color": {"r": 255, "g": 0, "b": 0}});
        store.set("devices/D1/desiredState", color).await;
        let color = json!({"r": 0, "g": 0, "b": 255});
        store.set("devices/D1/previewState", color).await;

        let (transport, mut rx) = SessionTransport::channel(1);
        let Ok(Ok(session)) =
            tokio::time::timeout(Duration::from_secs(1), registry.connect("D1", transport)).await
        else {
            panic!("connect stalled on a one-slot queue");
        };
        assert!(session.is_active());
        assert_eq!(store.total_listeners().await, 2);

        let mut received = 0;
        while received < 2 {
            let Ok(Some(Outbound::Command(_))) =
                tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
            else {
                panic!("restore missing after {received} commands");
            };
            received += 1;
        }
    }

    #[tokio::test]
    async fn acknowledged_ping_keeps_session() {
        let (registry, _store) = make_registry();
        let (session, _rx) = connect(&registry, "D1").await;

        for _ in 0..3 {
            let report = registry.sweep().await;
            assert_eq!(report.evicted, 0);
            assert!(registry.mark_alive("D1").await);
        }
        assert!(!session.transport().is_closed());
        assert!(!registry.mark_alive("D2").await);
    }

    #[tokio::test]
    async fn list_reports_active_sessions() {
        let (registry, _store) = make_registry();
        let (_b, _rx_b) = connect(&registry, "b").await;
        let (_a, _rx_a) = connect(&registry, "a").await;

        let list = registry.list().await;
        let ids: Vec<&str> = list.iter().map(|s| s.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(list.first().map(|s| s.watched_paths.len()), Some(2));
    }
}
