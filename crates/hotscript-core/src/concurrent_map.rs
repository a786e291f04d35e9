//! Sharded concurrent hash map backing the script registry.
//!
//! Each shard is a `RwLock<HashMap<K, V>>` padded to 128 bytes, and the key
//! hash picks the shard. Lookups of different keys never share a lock, and
//! a single-key insert replaces the previous value atomically.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of shards. Power of 2 for fast modulo.
pub const DEFAULT_SHARDS: usize = 64;

/// Upper bound for the shard count.
pub const MAX_SHARDS: usize = 256;

/// 128-byte alignment prevents false sharing between adjacent shards.
#[repr(align(128))]
struct Shard<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding a shard lock cannot leave a HashMap half-updated,
    // so poisoned guards are recovered.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.map.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.map.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A sharded map optimized for read-heavy workloads.
///
/// Thread-safe without external locking.
pub struct ShardedMap<K, V> {
    shards: Box<[Shard<K, V>]>,
}

impl<K, V> std::fmt::Debug for ShardedMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shard_count", &self.shards.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create with a specific shard count, clamped to `[1, MAX_SHARDS]`.
    #[must_use]
    pub fn with_shards(n: usize) -> Self {
        let n = n.clamp(1, MAX_SHARDS);
        let shards: Vec<Shard<K, V>> = (0..n).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// `K: Borrow<Q>` guarantees `K` and `Q` hash identically, so borrowed
    /// lookups land on the same shard as the owned key.
    #[inline]
    fn shard_for<Q>(&self, key: &Q) -> &Shard<K, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Insert or replace. Returns the previous value if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard_for(&key).write().insert(key, value)
    }

    /// Store `make()` under `key`, replacing any existing entry. A new key is
    /// added only if `admit_new` agrees. Both closures run under the shard
    /// lock, so `make` observes the same order as the writes.
    ///
    /// Returns `Ok(previous)` when stored and `Err(key)` when refused.
    pub fn insert_guarded<A, M>(&self, key: K, admit_new: A, make: M) -> Result<Option<V>, K>
    where
        A: FnOnce() -> bool,
        M: FnOnce() -> V,
    {
        let mut guard = self.shard_for(&key).write();
        match guard.entry(key) {
            Entry::Occupied(mut slot) => Ok(Some(slot.insert(make()))),
            Entry::Vacant(slot) => {
                if admit_new() {
                    slot.insert(make());
                    Ok(None)
                } else {
                    Err(slot.into_key())
                }
            }
        }
    }

    /// Clone of the value for a key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shard_for(key).read().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).read().contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).write().remove(key)
    }

    /// Remove `key` and run `on_removed` before the shard lock is released.
    pub fn remove_with<Q, F>(&self, key: &Q, on_removed: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V),
    {
        let mut guard = self.shard_for(key).write();
        let removed = guard.remove(key);
        if let Some(value) = &removed {
            on_removed(value);
        }
        removed
    }

    /// Total number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Collect all keys (snapshot, shard by shard).
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut result = Vec::new();
        for shard in self.shards.iter() {
            result.extend(shard.read().keys().cloned());
        }
        result
    }

    /// Per-shard entry counts (for diagnostics).
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.read().len()).collect()
    }
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
