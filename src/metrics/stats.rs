use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated on every store operation.
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    capacity_evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        StatsCounter {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            capacity_evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expired(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capacity_eviction(&self, count: u64) {
        self.capacity_evictions.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalidation(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self) -> Metrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0_f64
        } else {
            hits as f64 / total as f64
        };
        Metrics {
            hits,
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of store statistics.
///
/// For the activity log, removal counters are expressed in view records,
/// not users.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Lookups that found something.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Removed by a sweep for exceeding the retention window.
    pub expirations: u64,
    /// Removed by the capacity trim after a sweep.
    pub capacity_evictions: u64,
    /// Removed explicitly by the caller.
    pub invalidations: u64,
    /// `hits / (hits + misses)`, or `0.0` if no lookups have been made.
    pub hit_rate: f64,
}

impl Metrics {
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }

    /// Removals made by the store itself (age and capacity).
    pub fn evictions(&self) -> u64 {
        self.expirations + self.capacity_evictions
    }
}
