//! Pending request registry
//!
//! Tracks in-flight operations keyed by a locally generated `u32` id and
//! completes them when the matching answer arrives. Ids come from one
//! shared counter that is bumped before any suspension point, so two
//! callers never observe the same id. Entries are removed on completion,
//! on deadline expiry, and when their [`PendingRequest`] handle is dropped.

use crate::utils::error::{BridgeError, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;

/// Registry of outstanding requests
pub struct PendingRequestRegistry<T> {
    next_id: AtomicU32,
    entries: Mutex<HashMap<u32, oneshot::Sender<Result<T>>>>,
    deadline: Option<Duration>,
}

/// Handle to one registered request
///
/// Dropping the handle removes the entry from the registry.
pub struct PendingRequest<T> {
    id: u32,
    rx: oneshot::Receiver<Result<T>>,
    deadline: Option<Duration>,
    registry: Weak<PendingRequestRegistry<T>>,
}

impl<T: Send + 'static> PendingRequestRegistry<T> {
    /// Create a registry whose entries expire after `deadline`
    pub fn new(deadline: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU32::new(1),
            entries: Mutex::new(HashMap::new()),
            deadline,
        })
    }

    /// Allocate the next request id
    ///
    /// Skips 0 and any id that is still outstanding after a wrap.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if id != 0 && !self.entries.lock().contains_key(&id) {
                return id;
            }
        }
    }

    /// Register an awaitable for `id`
    pub fn create(self: &Arc<Self>, id: u32) -> PendingRequest<T> {
        let (tx, rx) = oneshot::channel();
        if self.entries.lock().insert(id, tx).is_some() {
            warn!("Pending request {} replaced an outstanding entry", id);
        }

        PendingRequest {
            id,
            rx,
            deadline: self.deadline,
            registry: Arc::downgrade(self),
        }
    }

    /// Resolve `id` with `value`; unknown ids are ignored
    pub fn complete(&self, id: u32, value: T) -> bool {
        match self.entries.lock().remove(&id) {
            Some(tx) => tx.send(Ok(value)).is_ok(),
            None => {
                debug!("No pending request for id {}", id);
                false
            }
        }
    }

    /// Reject `id` with `error`; unknown ids are ignored
    pub fn fail(&self, id: u32, error: BridgeError) -> bool {
        match self.entries.lock().remove(&id) {
            Some(tx) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Drop the entry for `id` without resolving it
    pub fn remove(&self, id: u32) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wait for completion, rejecting with `Timeout` once the deadline passes
    pub async fn wait(mut self) -> Result<T> {
        let received = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("Pending request {} expired after {:?}", self.id, deadline);
                    return Err(BridgeError::Timeout { id: self.id });
                }
            },
            None => (&mut self.rx).await,
        };

        match received {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Cancelled { id: self.id }),
        }
    }
}

impl<T> Drop for PendingRequest<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().remove(&self.id);
        }
    }
}
