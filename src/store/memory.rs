//! In-process [`StateStore`] implementation.
//!
//! Values and listeners live behind one [`tokio::sync::Mutex`], so a write
//! and the notification of every listener on that path happen atomically.
//! That gives each listener the writes in exactly the order they were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use super::{ListenerId, StateStore, StoreListener};
use crate::error::BridgeError;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    listeners: HashMap<ListenerId, Listener>,
}

#[derive(Debug)]
struct Listener {
    path: String,
    tx: mpsc::UnboundedSender<Value>,
}

/// Memory-backed key-path store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` at `path` and notifies the path's listeners.
    ///
    /// Returns the number of listeners notified.
    pub async fn set(&self, path: &str, value: Value) -> usize {
        let mut inner = self.inner.lock().await;
        let notified = notify(&mut inner.listeners, path, &value);
        inner.values.insert(path.to_string(), value);
        notified
    }

    /// Deletes the value at `path`, notifying listeners with `null`.
    ///
    /// Returns the previous value.
    pub async fn remove(&self, path: &str) -> Option<Value> {
        let mut inner = self.inner.lock().await;
        let previous = inner.values.remove(path);
        if previous.is_some() {
            notify(&mut inner.listeners, path, &Value::Null);
        }
        previous
    }

    /// Returns how many listeners are registered on `path`.
    pub async fn listener_count(&self, path: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.listeners.values().filter(|l| l.path == path).count()
    }

    /// Returns how many listeners are registered across all paths.
    pub async fn total_listeners(&self) -> usize {
        self.inner.lock().await.listeners.len()
    }
}

/// Sends `value` to every live listener on `path`, pruning listeners whose
/// receiving end has been dropped.
fn notify(listeners: &mut HashMap<ListenerId, Listener>, path: &str, value: &Value) -> usize {
    let mut notified = 0;
    listeners.retain(|_, listener| {
        if listener.path != path {
            return true;
        }
        if listener.tx.send(value.clone()).is_ok() {
            notified += 1;
            true
        } else {
            false
        }
    });
    notified
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, BridgeError> {
        Ok(self.inner.lock().await.values.get(path).cloned())
    }

    async fn subscribe(&self, path: &str) -> Result<StoreListener, BridgeError> {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, changes) = mpsc::unbounded_channel();
        self.inner.lock().await.listeners.insert(
            id,
            Listener {
                path: path.to_string(),
                tx,
            },
        );
        Ok(StoreListener { id, changes })
    }

    async fn unsubscribe(&self, id: ListenerId) -> Result<(), BridgeError> {
        self.inner.lock().await.listeners.remove(&id);
        Ok(())
    }
}
