//! External state store boundary.
//!
//! The bridge only needs three operations from the backing store: a
//! one-shot read, a change subscription, and unsubscription. They are
//! expressed as the [`StateStore`] trait so the cloud backend can be
//! swapped for [`MemoryStore`] in tests and local runs.
//!
//! Change notifications are delivered over a channel rather than through a
//! callback. The listener owns the receiving end, so nothing the store holds
//! can keep a dead transport alive.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BridgeError;

pub use memory::MemoryStore;

/// Identifies one registered listener inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a raw listener number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A registered change listener: its id and the stream of new values.
///
/// A deleted path is delivered as [`Value::Null`].
#[derive(Debug)]
pub struct StoreListener {
    /// Id to pass back to [`StateStore::unsubscribe`].
    pub id: ListenerId,
    /// Values written to the path after registration, in write order.
    pub changes: mpsc::UnboundedReceiver<Value>,
}

/// Key-path value store holding desired/preview device state.
#[async_trait]
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Reads the current value at `path`.
    ///
    /// The result reflects every write already delivered to listeners on
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] if the store cannot be reached.
    async fn read(&self, path: &str) -> Result<Option<Value>, BridgeError>;

    /// Registers a listener for changes at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] if the listener cannot be registered.
    async fn subscribe(&self, path: &str) -> Result<StoreListener, BridgeError>;

    /// Unregisters a listener. Unknown ids are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] if the store cannot confirm removal.
    async fn unsubscribe(&self, id: ListenerId) -> Result<(), BridgeError>;
}
