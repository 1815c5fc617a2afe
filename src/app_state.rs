//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bridge::StateBridge;
use crate::config::BridgeConfig;
use crate::session::SessionRegistry;
use crate::store::{MemoryStore, StateStore};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registry of connected devices.
    pub registry: Arc<SessionRegistry>,
    /// Backing state store, writable through the admin API.
    pub store: Arc<MemoryStore>,
    /// Runtime configuration.
    pub config: Arc<BridgeConfig>,
    /// Process start time, reported by the health endpoint.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wires the bridge and registry on top of `store`.
    #[must_use]
    pub fn new(config: BridgeConfig, store: Arc<MemoryStore>) -> Self {
        let dyn_store: Arc<dyn StateStore> = Arc::clone(&store) as Arc<dyn StateStore>;
        let bridge = StateBridge::new(dyn_store, config.watched_aspects(), config.detach_timeout);
        Self {
            registry: Arc::new(SessionRegistry::new(bridge)),
            store,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}
