//! Per-user "recently viewed" log, pruned by age.
//!
//! Each user maps to the sequence of content ids they viewed, in the order
//! the views were appended.  A user entry exists only while it holds at least
//! one record; the sweep that drains it deletes it in the same locked step.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::builder::ActivityLogBuilder;
use crate::clock::{is_expired, saturating_u64, TimeSource};
use crate::evictor::Sweep;
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::store::sharded::ShardedStore;

/// One view of one piece of content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewRecord<C> {
    pub content_id: C,
    pub recorded_at: Instant,
}

/// Records for one user, oldest first.  Never empty while stored.
type Records<C> = VecDeque<ViewRecord<C>>;

pub(crate) struct Inner<U, C> {
    pub(crate) store: ShardedStore<U, Records<C>>,
    pub(crate) clock: Arc<dyn TimeSource>,
    /// Soft cap on tracked users, enforced at the end of each sweep.
    pub(crate) max_users: Option<usize>,
    pub(crate) sweep_lock: Mutex<()>,
    pub(crate) metrics: StatsCounter,
}

/// A concurrent per-user activity log.
///
/// # Example
/// ```
/// use viewcache::ActivityLog;
///
/// let log: ActivityLog<String, String> = ActivityLog::builder().build();
/// log.append("u1".to_string(), "a1".to_string());
/// log.append("u1".to_string(), "a2".to_string());
/// assert_eq!(log.history(&"u1".to_string()), vec!["a1".to_string(), "a2".to_string()]);
/// assert!(log.history(&"nobody".to_string()).is_empty());
/// ```
pub struct ActivityLog<U, C> {
    inner: Arc<Inner<U, C>>,
}

impl<U, C> Clone for ActivityLog<U, C> {
    fn clone(&self) -> Self {
        ActivityLog {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U, C> ActivityLog<U, C>
where
    U: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        num_shards: usize,
        max_users: Option<usize>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        ActivityLog {
            inner: Arc::new(Inner {
                store: ShardedStore::new(num_shards),
                clock,
                max_users,
                sweep_lock: Mutex::new(()),
                metrics: StatsCounter::new(),
            }),
        }
    }

    pub fn builder() -> ActivityLogBuilder<U, C> {
        ActivityLogBuilder::new()
    }

    /// Appends a view of `content_id` to `user`'s history.
    ///
    /// Never truncates; retention is enforced only by
    /// [`sweep_older_than`](ActivityLog::sweep_older_than).
    pub fn append(&self, user: U, content_id: C) {
        let clock = &self.inner.clock;
        self.inner.store.update(user, |slot| {
            // Stamped under the shard lock so each user's records stay in
            // non-decreasing time order.
            let recorded_at = clock.now();
            slot.or_default().push_back(ViewRecord {
                content_id,
                recorded_at,
            });
        });
    }

    /// Content ids viewed by `user`, oldest first.  Empty if none retained.
    pub fn history(&self, user: &U) -> Vec<C> {
        self.lookup(user, |r| r.content_id.clone())
    }

    /// Like [`history`](ActivityLog::history), with timestamps.
    pub fn records(&self, user: &U) -> Vec<ViewRecord<C>> {
        self.lookup(user, ViewRecord::clone)
    }

    fn lookup<T>(&self, user: &U, f: impl FnMut(&ViewRecord<C>) -> T) -> Vec<T> {
        let found = self
            .inner
            .store
            .read(user, |records| records.map(|r| r.iter().map(f).collect::<Vec<T>>()));
        match found {
            Some(out) => {
                self.inner.metrics.record_hit();
                out
            }
            None => {
                self.inner.metrics.record_miss();
                Vec::new()
            }
        }
    }

    /// Drops everything recorded for `user`.  Returns the number of records
    /// removed.
    pub fn forget(&self, user: &U) -> usize {
        let removed = self.inner.store.remove(user).map_or(0, |r| r.len());
        self.inner.metrics.record_invalidation(removed as u64);
        removed
    }

    /// Drops every user's history.
    pub fn clear(&self) {
        let mut removed = 0u64;
        self.inner
            .store
            .drain(|_, records| removed += records.len() as u64);
        self.inner.metrics.record_invalidation(removed);
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Drops every record older than `window` at `now`, deleting users left
    /// with no records, then trims the least recently active users if a cap
    /// is configured.
    ///
    /// An `append` for a user serializes with the sweep on that user's shard
    /// lock: it either lands first and is kept (it is fresh), or lands after
    /// and re-creates the entry.  Either way the new record survives.
    pub fn sweep_older_than(&self, window: Duration, now: Instant) {
        let _sweeping = self.inner.sweep_lock.lock();
        let started = Instant::now();

        let mut expired = 0u64;
        let mut users_removed = 0u64;
        self.inner.store.retain(|_, records| {
            // Records are time-ordered, so stale ones form a prefix.
            while records
                .front()
                .is_some_and(|r| is_expired(r.recorded_at, window, now))
            {
                records.pop_front();
                expired += 1;
            }
            if records.is_empty() {
                users_removed += 1;
                return false;
            }
            true
        });
        self.inner.metrics.record_expired(expired);

        let trimmed = self.trim_to_capacity();

        debug!(
            expired,
            users_removed,
            trimmed,
            users = self.size(),
            elapsed_us = saturating_u64(started.elapsed().as_micros()),
            "activity log swept"
        );
    }

    /// Removes users whose latest view is oldest until at most `max_users`
    /// remain.  Returns the number of records dropped.
    fn trim_to_capacity(&self) -> u64 {
        let Some(max) = self.inner.max_users else {
            return 0;
        };
        let mut candidates: Vec<(Instant, U)> = self
            .inner
            .store
            .collect(|user, records| (latest(records), user.clone()))
            .into_iter()
            .filter_map(|(at, user)| at.map(|at| (at, user)))
            .collect();
        if candidates.len() <= max {
            return 0;
        }
        let excess = candidates.len() - max;
        candidates.sort_unstable_by_key(|(at, _)| *at);

        let mut users = 0u64;
        let mut removed = 0u64;
        for (at, user) in candidates.into_iter().take(excess) {
            if let Some(records) = self
                .inner
                .store
                .remove_if(&user, |r| latest(r) == Some(at))
            {
                users += 1;
                removed += records.len() as u64;
            }
        }
        self.inner.metrics.record_capacity_eviction(removed);
        if users > 0 {
            warn!(users, records = removed, max_users = max, "activity log over capacity, least active users trimmed");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Number of distinct users with at least one retained record.
    pub fn size(&self) -> usize {
        self.inner.store.len()
    }

    /// Total retained records across all users.
    pub fn record_count(&self) -> usize {
        self.inner.store.collect(|_, r| r.len()).into_iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn contains_user(&self, user: &U) -> bool {
        self.inner.store.contains(user)
    }

    pub fn max_users(&self) -> Option<usize> {
        self.inner.max_users
    }
}

#[inline]
fn latest<C>(records: &Records<C>) -> Option<Instant> {
    records.back().map(|r| r.recorded_at)
}

impl<U, C> Sweep for ActivityLog<U, C>
where
    U: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "activity_log"
    }

    fn sweep_older_than(&self, window: Duration, now: Instant) {
        ActivityLog::sweep_older_than(self, window, now);
    }

    fn size(&self) -> usize {
        ActivityLog::size(self)
    }

    fn stats(&self) -> Metrics {
        ActivityLog::stats(self)
    }
}
