//! Eviction listener: a callback invoked whenever a snapshot leaves the cache.
//!
//! # Example
//! ```
//! use viewcache::SnapshotCache;
//! use viewcache::listener::EvictionCause;
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<(String, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: SnapshotCache<String, String> = SnapshotCache::builder()
//!     .eviction_listener(move |key: &String, _snap, cause| {
//!         log2.lock().unwrap().push((key.clone(), cause));
//!     })
//!     .build();
//!
//! cache.put("a1".to_string(), "body".to_string());
//! cache.invalidate(&"a1".to_string());
//! assert_eq!(log.lock().unwrap().len(), 1);
//! ```

use std::sync::Arc;

// ---------------------------------------------------------------------------
// EvictionCause
// ---------------------------------------------------------------------------

/// The reason a snapshot was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionCause {
    /// Removed by a sweep because it was older than the retention window.
    Expired,
    /// Removed by the post-sweep capacity trim as one of the oldest entries.
    Capacity,
    /// Removed via [`SnapshotCache::invalidate`] or
    /// [`SnapshotCache::invalidate_all`].
    ///
    /// [`SnapshotCache::invalidate`]: crate::SnapshotCache::invalidate
    /// [`SnapshotCache::invalidate_all`]: crate::SnapshotCache::invalidate_all
    Explicit,
}

// ---------------------------------------------------------------------------
// EvictionListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time a snapshot is swept, trimmed or invalidated.
///
/// The callback runs on the thread that performed the removal, after the
/// shard lock has been released, so it may call back into the cache.  It
/// should still be quick: a sweep calls it once per removed entry.
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    fn on_evict(&self, key: &K, snapshot: Arc<V>, cause: EvictionCause);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`SnapshotCacheBuilder::eviction_listener`](crate::SnapshotCacheBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> EvictionListener<K, V> for FnListener<F>
where
    F: Fn(&K, Arc<V>, EvictionCause) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &K, snapshot: Arc<V>, cause: EvictionCause) {
        (self.0)(key, snapshot, cause)
    }
}
