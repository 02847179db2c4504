//! Per-key mutual exclusion.
//!
//! One `tokio::sync::Mutex` per service id, created lazily. Acquisition is
//! try-only: the caller either gets the guard immediately or learns that an
//! operation is already in flight for that key. Guards are owned, so they
//! can be held across await points without borrowing the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of service id → lock. The map itself is guarded by a std mutex,
/// held only for the entry lookup, never across an await.
pub struct LockMap {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockMap {
    /// Create an empty lock map.
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    /// Try to acquire the lock for `key`.
    ///
    /// Returns `None` if the lock is already held. Entries persist until
    /// `remove`, so the map is bounded by the number of live keys.
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };
        lock.try_lock_owned().ok()
    }

    /// Drop the entry for `key`, reclaiming its slot.
    ///
    /// Called when the keyed resource is deleted. An already-issued guard
    /// stays valid; a later `try_acquire` for the same key starts from a
    /// fresh lock.
    pub fn remove(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
    }

    /// Number of tracked keys (for diagnostics).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LockMap {
    fn default() -> Self {
        Self::new()
    }
}
