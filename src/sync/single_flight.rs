use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-source async locks, so at most one sync cycle runs for a source.
///
/// Entries live as long as the registry; there is one per source ever synced.
#[derive(Default)]
pub struct SourceLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `source_id`.
    pub async fn acquire(&self, source_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(source_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
