//! Periodic age-based eviction across both stores.
//!
//! The [`Evictor`] reads "now" once per pass and sweeps the snapshot cache
//! and then the activity log against that single boundary.  What triggers a
//! pass is up to the caller; [`Evictor::spawn`] provides a tokio interval
//! driver for services that don't have their own scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::clock::{saturating_u64, TimeSource};
use crate::config::CacheConfig;
use crate::metrics::stats::Metrics;

/// A store that can drop entries by age.
pub trait Sweep: Send + Sync + 'static {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Removes everything older than `window` as of `now`.
    fn sweep_older_than(&self, window: Duration, now: Instant);

    fn size(&self) -> usize;

    fn stats(&self) -> Metrics;
}

/// Sweeps a snapshot cache and an activity log against one shared "now".
pub struct Evictor {
    snapshots: Box<dyn Sweep>,
    activity: Box<dyn Sweep>,
    clock: Arc<dyn TimeSource>,
    retention_window: Duration,
}

impl Evictor {
    pub fn new(
        snapshots: impl Sweep,
        activity: impl Sweep,
        clock: Arc<dyn TimeSource>,
        retention_window: Duration,
    ) -> Self {
        Evictor {
            snapshots: Box::new(snapshots),
            activity: Box::new(activity),
            clock,
            retention_window,
        }
    }

    /// Like [`new`](Evictor::new), taking the retention window from `config`.
    pub fn from_config(
        snapshots: impl Sweep,
        activity: impl Sweep,
        clock: Arc<dyn TimeSource>,
        config: &CacheConfig,
    ) -> Self {
        Self::new(snapshots, activity, clock, config.retention_window)
    }

    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }

    /// Runs one eviction pass over both stores.
    ///
    /// Never fails; on empty stores it is a cheap no-op.  Each store holds
    /// its shard locks only one shard at a time, so request threads wait at
    /// most for a single shard to be filtered.
    pub fn run_sweep(&self) {
        let now = self.clock.now();
        self.snapshots.sweep_older_than(self.retention_window, now);
        self.activity.sweep_older_than(self.retention_window, now);

        let snapshots = self.snapshots.stats();
        let activity = self.activity.stats();
        info!(
            store = self.snapshots.name(),
            size = self.snapshots.size(),
            hit_rate = snapshots.hit_rate,
            evictions = snapshots.evictions(),
            "sweep completed"
        );
        info!(
            store = self.activity.name(),
            size = self.activity.size(),
            hit_rate = activity.hit_rate,
            evictions = activity.evictions(),
            "sweep completed"
        );
    }

    /// Runs [`run_sweep`](Evictor::run_sweep) every `interval` on the current
    /// tokio runtime.
    ///
    /// Each pass runs on the blocking pool, so async tasks sharing the runtime
    /// only ever wait on the shard lock they touch, never on a whole pass.
    /// The first pass happens one full interval after spawning.  The loop
    /// awaits each pass before the next tick, so passes never overlap; a pass
    /// that overruns delays the next tick instead of bunching ticks up.
    /// Abort the returned handle to stop the loop; a pass already in flight
    /// runs to completion.
    ///
    /// # Panics
    /// Panics if `interval` is zero or if called outside a tokio runtime.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        assert!(!interval.is_zero(), "sweep interval must be greater than zero");
        let evictor = Arc::new(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_ms = saturating_u64(interval.as_millis()),
                retention_ms = saturating_u64(evictor.retention_window.as_millis()),
                "sweep loop started"
            );
            loop {
                ticker.tick().await;
                let pass = Arc::clone(&evictor);
                if let Err(err) = tokio::task::spawn_blocking(move || pass.run_sweep()).await {
                    error!(error = %err, "sweep pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;

    /// Records the `now` it was swept with.
    struct Probe {
        seen: Arc<Mutex<Vec<(&'static str, Instant)>>>,
        name: &'static str,
    }

    impl Sweep for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn sweep_older_than(&self, _window: Duration, now: Instant) {
            self.seen.lock().push((self.name, now));
        }

        fn size(&self) -> usize {
            0
        }

        fn stats(&self) -> Metrics {
            Metrics {
                hits: 0,
                misses: 0,
                expirations: 0,
                capacity_evictions: 0,
                invalidations: 0,
                hit_rate: 0.0,
            }
        }
    }

    #[test]
    fn both_stores_share_one_now_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(ManualClock::new());
        clock.advance(Duration::from_secs(42));
        let evictor = Evictor::new(
            Probe { seen: seen.clone(), name: "snapshots" },
            Probe { seen: seen.clone(), name: "activity" },
            clock.clone(),
            Duration::from_secs(1800),
        );

        evictor.run_sweep();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "snapshots");
        assert_eq!(seen[1].0, "activity");
        assert_eq!(seen[0].1, seen[1].1);
        assert_eq!(seen[0].1, clock.at(Duration::from_secs(42)));
    }

    #[test]
    fn retention_comes_from_config() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let config = CacheConfig {
            retention_window: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        let evictor = Evictor::from_config(
            Probe { seen: seen.clone(), name: "a" },
            Probe { seen, name: "b" },
            Arc::new(ManualClock::new()),
            &config,
        );
        assert_eq!(evictor.retention_window(), Duration::from_secs(60));
    }
}
