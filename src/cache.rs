use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::builder::SnapshotCacheBuilder;
use crate::clock::{is_expired, saturating_u64, TimeSource};
use crate::evictor::Sweep;
use crate::listener::{EvictionCause, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::store::sharded::ShardedStore;

// ---------------------------------------------------------------------------
// Cache entry
// ---------------------------------------------------------------------------

/// A cached snapshot plus the instant it was (re)written.
///
/// Replaced wholesale on every `put`; never mutated in place.
pub(crate) struct CacheEntry<V> {
    pub(crate) snapshot: Arc<V>,
    pub(crate) written_at: Instant,
}

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`SnapshotCache`].
pub(crate) struct Inner<K, V> {
    pub(crate) store: ShardedStore<K, CacheEntry<V>>,
    pub(crate) clock: Arc<dyn TimeSource>,
    /// Soft cap on entries, enforced at the end of each sweep.
    pub(crate) max_capacity: Option<usize>,
    /// Optional eviction listener.  `None` if the user didn't register one.
    pub(crate) listener: Option<Box<dyn EvictionListener<K, V>>>,
    /// Serializes sweeps; puts and gets never touch it.
    pub(crate) sweep_lock: Mutex<()>,
    pub(crate) metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent cache of content snapshots keyed by content id.
///
/// Entries are only ever removed by [`sweep_older_than`], the optional
/// capacity trim that follows it, or an explicit [`invalidate`]; reads never
/// check age.
///
/// # Example
/// ```
/// use viewcache::SnapshotCache;
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
///
/// let cache: SnapshotCache<String, String> = SnapshotCache::builder().build();
/// cache.put("a1".to_string(), "snapshot".to_string());
/// assert_eq!(cache.get(&"a1".to_string()), Some(Arc::new("snapshot".to_string())));
///
/// cache.sweep_older_than(Duration::from_secs(1800), Instant::now());
/// assert_eq!(cache.size(), 1);
/// ```
///
/// [`sweep_older_than`]: SnapshotCache::sweep_older_than
/// [`invalidate`]: SnapshotCache::invalidate
pub struct SnapshotCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for SnapshotCache<K, V> {
    fn clone(&self) -> Self {
        SnapshotCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SnapshotCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        num_shards: usize,
        max_capacity: Option<usize>,
        clock: Arc<dyn TimeSource>,
        listener: Option<Box<dyn EvictionListener<K, V>>>,
    ) -> Self {
        SnapshotCache {
            inner: Arc::new(Inner {
                store: ShardedStore::new(num_shards),
                clock,
                max_capacity,
                listener,
                sweep_lock: Mutex::new(()),
                metrics: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`SnapshotCacheBuilder`] for constructing a new cache.
    pub fn builder() -> SnapshotCacheBuilder<K, V> {
        SnapshotCacheBuilder::new()
    }

    // -----------------------------------------------------------------------
    // Hot-path: put / get
    // -----------------------------------------------------------------------

    /// Inserts or replaces the snapshot for `key`, stamped with the current
    /// time.
    pub fn put(&self, key: K, snapshot: V) {
        self.put_arc(key, Arc::new(snapshot));
    }

    /// Like [`put`](SnapshotCache::put) for a snapshot that is already shared.
    pub fn put_arc(&self, key: K, snapshot: Arc<V>) {
        let clock = &self.inner.clock;
        self.inner.store.update(key, |slot| {
            // Stamped under the shard lock: lock order is timestamp order, so
            // the write holding the later reading is always the one left.
            let entry = CacheEntry {
                snapshot,
                written_at: clock.now(),
            };
            match slot {
                Entry::Occupied(mut o) => {
                    o.insert(entry);
                }
                Entry::Vacant(v) => {
                    v.insert(entry);
                }
            }
        });
    }

    /// Returns the snapshot for `key`, if present.  Age is not checked.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self
            .inner
            .store
            .read(key, |e| e.map(|e| Arc::clone(&e.snapshot)));
        match found {
            Some(_) => self.inner.metrics.record_hit(),
            None => self.inner.metrics.record_miss(),
        }
        found
    }

    /// The instant the current snapshot for `key` was written.
    pub fn written_at(&self, key: &K) -> Option<Instant> {
        self.inner.store.read(key, |e| e.map(|e| e.written_at))
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Removes the entry for `key`, if present, returning its snapshot.
    ///
    /// Intended for the content-mutation path (edits, favorites) so readers
    /// don't keep serving a snapshot known to be outdated.
    pub fn invalidate(&self, key: &K) -> Option<Arc<V>> {
        let entry = self.inner.store.remove(key)?;
        self.inner.metrics.record_invalidation(1);
        self.notify(key, Arc::clone(&entry.snapshot), EvictionCause::Explicit);
        Some(entry.snapshot)
    }

    /// Removes all entries.
    pub fn invalidate_all(&self) {
        let mut removed = 0u64;
        self.inner.store.drain(|key, entry| {
            removed += 1;
            self.notify(&key, entry.snapshot, EvictionCause::Explicit);
        });
        self.inner.metrics.record_invalidation(removed);
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Removes every entry whose age at `now` exceeds `window`, then trims the
    /// oldest entries if a capacity is configured.
    ///
    /// Each shard is filtered under its own write lock, against the entry that
    /// is live at that moment.  A `put` racing the sweep either lands before
    /// its shard is filtered (and is judged by its own fresh timestamp) or
    /// after (and is untouched), so a fresh write is never evicted.
    /// Entries written after `now` count as age zero.
    pub fn sweep_older_than(&self, window: Duration, now: Instant) {
        let _sweeping = self.inner.sweep_lock.lock();
        let started = Instant::now();

        let track = self.inner.listener.is_some();
        let mut expired: Vec<(K, Arc<V>)> = Vec::new();
        let mut expired_count = 0u64;
        self.inner.store.retain(|key, entry| {
            if !is_expired(entry.written_at, window, now) {
                return true;
            }
            expired_count += 1;
            if track {
                expired.push((key.clone(), Arc::clone(&entry.snapshot)));
            }
            false
        });
        self.inner.metrics.record_expired(expired_count);
        for (key, snapshot) in expired {
            self.notify(&key, snapshot, EvictionCause::Expired);
        }

        let trimmed = self.trim_to_capacity();

        debug!(
            expired = expired_count,
            trimmed,
            remaining = self.size(),
            elapsed_us = saturating_u64(started.elapsed().as_micros()),
            "snapshot cache swept"
        );
    }

    /// Removes the oldest-written entries beyond `max_capacity`.
    ///
    /// Victims are chosen from a per-shard scan and removed only if they still
    /// carry the timestamp they were chosen by; an entry refreshed in between
    /// survives, so the cache may stay slightly over capacity until the next
    /// sweep.
    fn trim_to_capacity(&self) -> u64 {
        let Some(max) = self.inner.max_capacity else {
            return 0;
        };
        let mut candidates: Vec<(Instant, K)> = self
            .inner
            .store
            .collect(|key, entry| (entry.written_at, key.clone()));
        if candidates.len() <= max {
            return 0;
        }
        let excess = candidates.len() - max;
        candidates.sort_unstable_by_key(|(written_at, _)| *written_at);

        let mut removed = 0u64;
        for (written_at, key) in candidates.into_iter().take(excess) {
            if let Some(entry) = self
                .inner
                .store
                .remove_if(&key, |e| e.written_at == written_at)
            {
                removed += 1;
                self.notify(&key, entry.snapshot, EvictionCause::Capacity);
            }
        }
        self.inner.metrics.record_capacity_eviction(removed);
        if removed > 0 {
            warn!(removed, max_capacity = max, "snapshot cache over capacity, oldest entries trimmed");
        }
        removed
    }

    #[inline]
    fn notify(&self, key: &K, snapshot: Arc<V>, cause: EvictionCause) {
        if let Some(listener) = &self.inner.listener {
            listener.on_evict(key, snapshot, cause);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Number of keys currently cached.
    pub fn size(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.store.contains(key)
    }

    pub fn max_capacity(&self) -> Option<usize> {
        self.inner.max_capacity
    }
}

impl<K, V> Sweep for SnapshotCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "snapshot_cache"
    }

    fn sweep_older_than(&self, window: Duration, now: Instant) {
        SnapshotCache::sweep_older_than(self, window, now);
    }

    fn size(&self) -> usize {
        SnapshotCache::size(self)
    }

    fn stats(&self) -> Metrics {
        SnapshotCache::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const MIN: Duration = Duration::from_secs(60);
    const WINDOW: Duration = Duration::from_secs(30 * 60);

    fn cache_with(clock: &Arc<ManualClock>) -> SnapshotCache<&'static str, u32> {
        SnapshotCache::builder().num_shards(4).clock(clock.clone()).build()
    }

    #[test]
    fn put_stamps_with_clock() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        clock.advance(7 * MIN);
        cache.put("a1", 1);
        assert_eq!(cache.written_at(&"a1"), Some(clock.at(7 * MIN)));
    }

    #[test]
    fn refresh_replaces_snapshot_and_timestamp() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        cache.put("a1", 1);
        clock.advance(25 * MIN);
        cache.put("a1", 2);

        cache.sweep_older_than(WINDOW, clock.at(40 * MIN));
        assert_eq!(cache.get(&"a1"), Some(Arc::new(2)));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn entry_exactly_at_window_survives() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        cache.put("a1", 1);
        cache.sweep_older_than(WINDOW, clock.at(WINDOW));
        assert!(cache.contains(&"a1"));
    }

    #[test]
    fn entry_written_after_now_is_kept() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        clock.advance(60 * MIN);
        cache.put("late", 1);
        cache.sweep_older_than(WINDOW, clock.at(Duration::ZERO));
        assert!(cache.contains(&"late"));
    }

    #[test]
    fn sweep_counts_expirations() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        for key in ["a", "b", "c"] {
            cache.put(key, 0);
        }
        cache.sweep_older_than(WINDOW, clock.at(31 * MIN));
        let stats = cache.stats();
        assert_eq!(stats.expirations, 3);
        assert_eq!(stats.capacity_evictions, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_trim_removes_oldest_first() {
        let clock = Arc::new(ManualClock::new());
        let cache: SnapshotCache<u32, u32> = SnapshotCache::builder()
            .num_shards(4)
            .max_capacity(3)
            .clock(clock.clone())
            .build();
        assert_eq!(cache.max_capacity(), Some(3));
        for i in 0..5 {
            cache.put(i, i);
            clock.advance(MIN);
        }

        cache.sweep_older_than(WINDOW, clock.now());
        assert_eq!(cache.size(), 3);
        assert!(!cache.contains(&0));
        assert!(!cache.contains(&1));
        assert!((2..5).all(|i| cache.contains(&i)));
        assert_eq!(cache.stats().capacity_evictions, 2);
    }

    #[test]
    fn invalidate_all_counts_removals() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(&clock);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 2);
    }
}
