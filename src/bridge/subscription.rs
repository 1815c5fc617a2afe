//! Explicit subscription handles owned by a device session.
//!
//! A [`SubscriptionHandle`] pairs the store listener id with the task that
//! forwards its changes. The session owns the handle, and teardown detaches
//! it through the same value that attach produced. Nothing is re-created on
//! the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::aspect::StateAspect;
use crate::error::BridgeError;
use crate::store::{ListenerId, StateStore};

/// One attached store listener and its forwarding task.
#[derive(Debug)]
pub struct SubscriptionHandle {
    aspect: StateAspect,
    path: String,
    listener: ListenerId,
    forwarder: JoinHandle<()>,
    detached: AtomicBool,
}

impl SubscriptionHandle {
    /// Wraps an attached listener.
    #[must_use]
    pub fn new(
        aspect: StateAspect,
        path: String,
        listener: ListenerId,
        forwarder: JoinHandle<()>,
    ) -> Self {
        Self {
            aspect,
            path,
            listener,
            forwarder,
            detached: AtomicBool::new(false),
        }
    }

    /// Aspect this handle watches.
    #[must_use]
    pub const fn aspect(&self) -> StateAspect {
        self.aspect
    }

    /// Store path this handle watches.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Store-side listener id.
    #[must_use]
    pub const fn listener(&self) -> ListenerId {
        self.listener
    }

    /// Returns `true` once [`Self::detach`] has run.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Stops forwarding and unregisters the listener from the store.
    ///
    /// Runs at most once per handle; later calls return `Ok(())` without
    /// touching the store. The forwarding task is stopped before the store
    /// is contacted, so no change is delivered after this call starts even
    /// if the store never answers.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SubscriptionDetachFailure`] if the store
    /// reports an error or does not answer within `timeout`. The handle is
    /// still considered detached.
    pub async fn detach(
        &self,
        store: &dyn StateStore,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        if self.detached.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.forwarder.abort();

        let failure = |reason: String| BridgeError::SubscriptionDetachFailure {
            path: self.path.clone(),
            reason,
        };
        match tokio::time::timeout(timeout, store.unsubscribe(self.listener)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(failure(err.to_string())),
            Err(_) => Err(failure(format!("no confirmation within {timeout:?}"))),
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        // The store listener cannot be removed without an await; the task can.
        self.forwarder.abort();
    }
}
