use std::collections::hash_map::Entry;
use std::hash::Hash;
use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
pub(crate) struct Shard<K, V> {
    pub(crate) map: RwLock<AHashMap<K, V>>,
}

// ---------------------------------------------------------------------------
// ShardedStore
// ---------------------------------------------------------------------------

/// A thread-safe map backed by `N` independently-locked shards.
///
/// Reads use a shared lock, writes use an exclusive lock, both per-shard.
/// Whole-store passes ([`retain`](ShardedStore::retain)) lock one shard at a
/// time, so a sweep never stalls writers to other shards.
pub struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.
    build_hasher: RandomState,
}

impl<K: Hash + Eq, V> ShardedStore<K, V> {
    pub fn new(num_shards: usize) -> Self {
        assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
        }
    }

    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) & self.shard_mask
    }

    #[inline]
    fn shard_for(&self, key: &K) -> &Shard<K, V> {
        &self.shards[self.shard_index(key)]
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Runs `f` against the value for `key` under the shard's read lock.
    pub fn read<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
        f(self.shard_for(key).map.read().get(key))
    }

    /// Runs `f` against the map entry for `key` under the shard's write lock.
    ///
    /// Everything `f` does is atomic with respect to every other operation on
    /// the same key, including an in-flight [`retain`](ShardedStore::retain).
    pub fn update<R>(&self, key: K, f: impl FnOnce(Entry<'_, K, V>) -> R) -> R {
        let mut map = self.shard_for(&key).map.write();
        f(map.entry(key))
    }

    /// Removes the entry for `key`.  Returns the removed value, if any.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard_for(key).map.write().remove(key)
    }

    /// Removes the entry for `key` only if `pred` holds for the value that is
    /// present at the moment the write lock is held.
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut map = self.shard_for(key).map.write();
        if map.get(key).is_some_and(pred) {
            map.remove(key)
        } else {
            None
        }
    }

    /// Returns `true` if the key is present.
    pub fn contains(&self, key: &K) -> bool {
        self.shard_for(key).map.read().contains_key(key)
    }

    /// Keeps only the entries for which `f` returns `true`.
    ///
    /// Each shard is filtered under its own write lock, so `f` always sees the
    /// live value it is deciding about, never a copy taken earlier.
    pub fn retain(&self, mut f: impl FnMut(&K, &mut V) -> bool) {
        for shard in self.shards.iter() {
            shard.map.write().retain(|k, v| f(k, v));
        }
    }

    /// Maps every entry through `f`, one shard read lock at a time.
    ///
    /// The result is a point-in-time view per shard, not across shards.
    pub fn collect<T>(&self, mut f: impl FnMut(&K, &V) -> T) -> Vec<T> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            out.extend(shard.map.read().iter().map(|(k, v)| f(k, v)));
        }
        out
    }

    /// Returns the total number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }

    /// Drains every shard, handing each removed pair to `f` after that
    /// shard's lock has been released.
    pub fn drain(&self, mut f: impl FnMut(K, V)) {
        for shard in self.shards.iter() {
            let drained: Vec<(K, V)> = shard.map.write().drain().collect();
            for (k, v) in drained {
                f(k, v);
            }
        }
    }
}
