use ahash::AHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Number of shards for the lock table.
/// Must be a power of 2 for fast modulo via bitwise AND.
const NUM_SHARDS: usize = 64;

/// Shard size at which idle entries are dropped on insert.
const SHARD_PRUNE_THRESHOLD: usize = 1024;

/// Async mutual exclusion per string key.
///
/// Keys are distributed across shards by hash so that unrelated keys
/// rarely contend on the table itself. The guard is held across await
/// points, so the per-key lock is a tokio mutex.
pub struct KeyedLocks {
    shards: Vec<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        KeyedLocks { shards }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let shard = &self.shards[self.shard_index(key)];

        // Fast path: read lock
        if let Some(lock) = shard.read().get(key) {
            return lock.clone();
        }

        let mut write_guard = shard.write();

        // Double-check after acquiring write lock
        if let Some(lock) = write_guard.get(key) {
            return lock.clone();
        }

        if write_guard.len() >= SHARD_PRUNE_THRESHOLD {
            write_guard.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        let lock = Arc::new(Mutex::new(()));
        write_guard.insert(key.to_string(), lock.clone());
        lock
    }

    /// Drop entries nobody holds or waits on.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let mut pruned = 0;

        for shard in &self.shards {
            let mut write_guard = shard.write();
            let before = write_guard.len();
            // The table's own reference is the only one left.
            write_guard.retain(|_, lock| Arc::strong_count(lock) > 1);
            pruned += before - write_guard.len();
        }

        pruned
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (NUM_SHARDS - 1)
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}
