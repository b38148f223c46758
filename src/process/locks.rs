use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-tenant operation locks.
///
/// Lifecycle operations on one ID run one at a time; different IDs never
/// contend.
#[derive(Debug, Default)]
pub struct OperationLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted tenant if nobody else holds it
    pub fn forget(&self, id: &str) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
