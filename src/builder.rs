use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use crate::activity::ActivityLog;
use crate::cache::SnapshotCache;
use crate::clock::{SystemClock, TimeSource};
use crate::config::CacheConfig;
use crate::listener::{EvictionCause, EvictionListener, FnListener};

const DEFAULT_SHARDS: usize = 64;

fn check_shards(n: usize) {
    assert!(n > 0 && n.is_power_of_two(), "num_shards must be a power of two");
}

// ---------------------------------------------------------------------------
// SnapshotCacheBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing a [`SnapshotCache`].
///
/// # Example
/// ```
/// use viewcache::{CacheConfig, SnapshotCache};
///
/// let config = CacheConfig { snapshot_capacity: Some(1_000), ..CacheConfig::default() };
/// let cache: SnapshotCache<String, String> = SnapshotCache::builder()
///     .config(&config)
///     .build();
/// assert_eq!(cache.max_capacity(), Some(1_000));
/// ```
pub struct SnapshotCacheBuilder<K, V> {
    num_shards: usize,
    max_capacity: Option<usize>,
    clock: Arc<dyn TimeSource>,
    listener: Option<Box<dyn EvictionListener<K, V>>>,
}

impl<K: 'static, V: 'static> SnapshotCacheBuilder<K, V> {
    pub fn new() -> Self {
        SnapshotCacheBuilder {
            num_shards: DEFAULT_SHARDS,
            max_capacity: None,
            clock: Arc::new(SystemClock),
            listener: None,
        }
    }

    /// Apply shard count and snapshot capacity from `config`.
    pub fn config(mut self, config: &CacheConfig) -> Self {
        check_shards(config.num_shards);
        self.num_shards = config.num_shards;
        if let Some(cap) = config.snapshot_capacity {
            self = self.max_capacity(cap);
        }
        self
    }

    /// Set the number of internal shards (must be a power of two; default: 64).
    pub fn num_shards(mut self, n: usize) -> Self {
        check_shards(n);
        self.num_shards = n;
        self
    }

    /// Keep at most `max` entries; the oldest-written are trimmed after each
    /// sweep.  Unbounded by default.
    pub fn max_capacity(mut self, max: usize) -> Self {
        assert!(max > 0, "max_capacity must be greater than 0");
        self.max_capacity = Some(max);
        self
    }

    /// Time source used to stamp writes (default: [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Register an eviction listener closure.
    ///
    /// The closure is called on the removing thread once per swept, trimmed
    /// or invalidated entry, after the shard lock is released.
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, Arc<V>, EvictionCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }
}

impl<K: 'static, V: 'static> Default for SnapshotCacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SnapshotCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> SnapshotCache<K, V> {
        SnapshotCache::new(self.num_shards, self.max_capacity, self.clock, self.listener)
    }
}

// ---------------------------------------------------------------------------
// ActivityLogBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing an [`ActivityLog`].
pub struct ActivityLogBuilder<U, C> {
    num_shards: usize,
    max_users: Option<usize>,
    clock: Arc<dyn TimeSource>,
    _marker: PhantomData<fn() -> (U, C)>,
}

impl<U, C> ActivityLogBuilder<U, C> {
    pub fn new() -> Self {
        ActivityLogBuilder {
            num_shards: DEFAULT_SHARDS,
            max_users: None,
            clock: Arc::new(SystemClock),
            _marker: PhantomData,
        }
    }

    /// Apply shard count and user capacity from `config`.
    pub fn config(mut self, config: &CacheConfig) -> Self {
        check_shards(config.num_shards);
        self.num_shards = config.num_shards;
        if let Some(cap) = config.activity_capacity {
            self = self.max_users(cap);
        }
        self
    }

    pub fn num_shards(mut self, n: usize) -> Self {
        check_shards(n);
        self.num_shards = n;
        self
    }

    /// Track at most `max` users; those whose latest view is oldest are
    /// trimmed after each sweep.  Unbounded by default.
    pub fn max_users(mut self, max: usize) -> Self {
        assert!(max > 0, "max_users must be greater than 0");
        self.max_users = Some(max);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }
}

impl<U, C> Default for ActivityLogBuilder<U, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U, C> ActivityLogBuilder<U, C>
where
    U: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub fn build(self) -> ActivityLog<U, C> {
        ActivityLog::new(self.num_shards, self.max_users, self.clock)
    }
}
