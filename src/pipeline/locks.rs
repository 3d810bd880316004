//! Per-identity mutual exclusion.
//!
//! Workspaces and archives are keyed by device identity, so two builds for
//! the same device must never overlap. Builds for different devices share
//! nothing and run in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily populated map of one async mutex per identity.
#[derive(Clone, Debug, Default)]
pub struct IdentityLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl IdentityLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // An entry nobody holds or waits on can be dropped safely.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(identity.to_owned()).or_default())
    }

    /// Waits for exclusive access to `identity`. Access is released when the
    /// guard drops.
    pub async fn lock_owned(&self, identity: &str) -> OwnedMutexGuard<()> {
        self.entry(identity).lock_owned().await
    }

    /// Number of identities currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
