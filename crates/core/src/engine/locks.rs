//! Per-transaction serialization.

use std::sync::Arc;

use dashmap::DashMap;
use railflow_shared::types::TransactionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per transaction in flight.
///
/// Entries are created on demand and dropped by [`release_idle`](Self::release_idle)
/// once nobody holds or waits for them.
#[derive(Debug, Default)]
pub struct TransactionLocks {
    locks: DashMap<TransactionId, Arc<Mutex<()>>>,
}

impl TransactionLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a transaction.
    pub async fn acquire(&self, id: TransactionId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drops lock entries nobody references.
    pub fn release_idle(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of lock entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no lock entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
