//! Property-based tests for age-based eviction.
//!
//! Both stores are driven by random interleavings of writes, clock advances
//! and sweeps, and compared after every sweep against a plain model that
//! keeps exactly the writes whose age is within the retention window.
//!
//! Properties covered:
//! - no entry or record older than the window survives a sweep
//! - a write within the window is never removed
//! - no user is left with an empty history
//! - a repeated sweep with the same `now` removes nothing
//! - store sizes stay bounded under a constant write rate

use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use viewcache::{ActivityLog, Evictor, ManualClock, SnapshotCache, TimeSource};

const KEYS: u8 = 16;
const USERS: u8 = 8;

#[derive(Debug, Clone)]
enum Op {
    Put { key: u8, value: u32 },
    Append { user: u8, content: u16 },
    Advance(u64),
    Sweep,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..KEYS, any::<u32>()).prop_map(|(key, value)| Op::Put { key, value }),
        4 => (0..USERS, 0u16..64).prop_map(|(user, content)| Op::Append { user, content }),
        3 => (0u64..900).prop_map(Op::Advance),
        1 => Just(Op::Sweep),
    ]
}

/// Reference behaviour: what each store must hold after a sweep.
#[derive(Default)]
struct Model {
    snapshots: HashMap<u8, (u32, Duration)>,
    views: HashMap<u8, VecDeque<(u16, Duration)>>,
}

impl Model {
    fn sweep(&mut self, window: Duration, now: Duration) {
        self.snapshots.retain(|_, (_, at)| now - *at <= window);
        for records in self.views.values_mut() {
            records.retain(|(_, at)| now - *at <= window);
        }
        self.views.retain(|_, records| !records.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn stores_match_age_model(
        ops in prop::collection::vec(arb_op(), 1..200),
        window_secs in 60u64..3_600,
    ) {
        let window = Duration::from_secs(window_secs);
        let clock = Arc::new(ManualClock::new());
        let cache: SnapshotCache<u8, u32> =
            SnapshotCache::builder().num_shards(4).clock(clock.clone()).build();
        let log: ActivityLog<u8, u16> =
            ActivityLog::builder().num_shards(4).clock(clock.clone()).build();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Put { key, value } => {
                    cache.put(key, value);
                    model.snapshots.insert(key, (value, clock.elapsed()));
                }
                Op::Append { user, content } => {
                    log.append(user, content);
                    model
                        .views
                        .entry(user)
                        .or_default()
                        .push_back((content, clock.elapsed()));
                }
                Op::Advance(secs) => clock.advance(Duration::from_secs(secs)),
                Op::Sweep => {
                    let now = clock.now();
                    cache.sweep_older_than(window, now);
                    log.sweep_older_than(window, now);
                    model.sweep(window, clock.elapsed());

                    for key in 0..KEYS {
                        let expected = model.snapshots.get(&key);
                        prop_assert_eq!(cache.get(&key).map(|v| *v), expected.map(|(v, _)| *v));
                        if let Some(at) = cache.written_at(&key) {
                            prop_assert!(now - at <= window, "stale snapshot survived a sweep");
                        }
                    }
                    for user in 0..USERS {
                        let expected: Vec<u16> = model
                            .views
                            .get(&user)
                            .map(|r| r.iter().map(|(c, _)| *c).collect())
                            .unwrap_or_default();
                        prop_assert_eq!(log.history(&user), expected);
                        prop_assert!(log.records(&user).iter().all(|r| now - r.recorded_at <= window));
                        if log.contains_user(&user) {
                            prop_assert!(!log.history(&user).is_empty(), "empty user entry kept");
                        }
                    }
                    prop_assert_eq!(cache.size(), model.snapshots.len());
                    prop_assert_eq!(log.size(), model.views.len());

                    // A second pass at the same instant has nothing left to do.
                    let (cache_before, log_before) = (cache.stats(), log.stats());
                    cache.sweep_older_than(window, now);
                    log.sweep_older_than(window, now);
                    prop_assert_eq!(cache.stats().expirations, cache_before.expirations);
                    prop_assert_eq!(log.stats().expirations, log_before.expirations);
                    prop_assert_eq!(cache.size(), model.snapshots.len());
                }
            }
        }
    }

    #[test]
    fn sizes_are_bounded_by_rate_window_and_interval(
        steps in 1usize..4_000,
        window_secs in 1u64..600,
        interval_secs in 1u64..120,
        users in 1u64..50,
    ) {
        let clock = Arc::new(ManualClock::new());
        let cache: SnapshotCache<u64, u64> =
            SnapshotCache::builder().num_shards(8).clock(clock.clone()).build();
        let log: ActivityLog<u64, u64> =
            ActivityLog::builder().num_shards(8).clock(clock.clone()).build();
        let evictor = Evictor::new(
            cache.clone(),
            log.clone(),
            clock.clone(),
            Duration::from_secs(window_secs),
        );

        // One write per second to each store, every key distinct.
        let bound = (window_secs + interval_secs + 1) as usize;
        for i in 0..steps as u64 {
            cache.put(i, i);
            log.append(i % users, i);
            clock.advance(Duration::from_secs(1));
            if i % interval_secs == 0 {
                evictor.run_sweep();
            }
            prop_assert!(cache.size() <= bound, "cache size {} > {}", cache.size(), bound);
            prop_assert!(log.record_count() <= bound, "log holds {} > {}", log.record_count(), bound);
            prop_assert!(log.size() as u64 <= users);
        }
    }
}
