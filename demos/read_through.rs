//! Read-through simulation: article reads against a snapshot cache backed by
//! a slow "database", with per-user view tracking and periodic sweeps.
//!
//! Simulated time runs on a `ManualClock`, so six hours of traffic replay in
//! well under a second.  Sweep summaries are logged through `tracing`.
//!
//! Run with:
//!     RUST_LOG=viewcache=debug cargo run --example read_through --release

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use viewcache::{ActivityLog, CacheConfig, Evictor, ManualClock, SnapshotCache};

/// Articles in the backing store.
const ARTICLES: usize = 20_000;
/// Distinct readers.
const USERS: u64 = 2_000;
/// Simulated reads.
const READS: usize = 216_000;
/// Simulated time between two reads.
const READ_GAP: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Article {
    slug: String,
    title: String,
    favorites: u32,
}

// ---------------------------------------------------------------------------
// Zipf(s=1.0) sampler: article popularity follows a power law.
// ---------------------------------------------------------------------------

struct Xorshift64(u64);

impl Xorshift64 {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Returns a uniform float in (0, 1].
    fn uniform(&mut self) -> f64 {
        let bits = self.next() >> 11;
        (bits + 1) as f64 / (1u64 << 53) as f64
    }

    /// Zipf(s=1) sample in [0, pool).
    fn zipf(&mut self, pool: usize) -> usize {
        let k = (pool as f64).powf(self.uniform()) as usize;
        k.saturating_sub(1).min(pool - 1)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match CacheConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let database: HashMap<String, Article> = (0..ARTICLES)
        .map(|i| {
            let id = format!("article-{i}");
            let article = Article {
                slug: format!("how-to-{i}"),
                title: format!("How to do thing #{i}"),
                favorites: (i % 97) as u32,
            };
            (id, article)
        })
        .collect();

    let clock = Arc::new(ManualClock::new());
    let cache: SnapshotCache<String, Article> = SnapshotCache::builder()
        .config(&config)
        .clock(clock.clone())
        .build();
    let views: ActivityLog<u64, String> = ActivityLog::builder()
        .config(&config)
        .clock(clock.clone())
        .build();
    let evictor = Evictor::from_config(cache.clone(), views.clone(), clock.clone(), &config);

    let mut rng = Xorshift64(0xDEAD_BEEF_1234_5678);
    let mut db_fetches = 0usize;
    let mut next_sweep = config.sweep_interval;

    for read in 0..READS {
        let id = format!("article-{}", rng.zipf(ARTICLES));
        let user = rng.next() % USERS;

        if cache.get(&id).is_none() {
            if let Some(row) = database.get(&id) {
                db_fetches += 1;
                cache.put(
                    id.clone(),
                    Article {
                        slug: row.slug.clone(),
                        title: row.title.clone(),
                        favorites: row.favorites,
                    },
                );
            }
        }
        views.append(user, id);

        // A favorite changes the article: drop its snapshot.
        if read % 500 == 0 {
            cache.invalidate(&format!("article-{}", rng.zipf(ARTICLES)));
        }

        clock.advance(READ_GAP);
        if clock.elapsed() >= next_sweep {
            evictor.run_sweep();
            next_sweep += config.sweep_interval;
        }
    }

    let stats = cache.stats();
    println!();
    println!("  Simulated time   : {:>10.1} h", clock.elapsed().as_secs_f64() / 3600.0);
    println!("  Reads            : {READS:>10}");
    println!("  Database fetches : {db_fetches:>10}");
    println!("  Cache hit rate   : {:>9.2}%", stats.hit_rate * 100.0);
    println!("  Cached snapshots : {:>10}", cache.size());
    println!("  Swept snapshots  : {:>10}", stats.expirations);
    println!("  Invalidated      : {:>10}", stats.invalidations);
    println!("  Tracked users    : {:>10}", views.size());
    println!("  Retained views   : {:>10}", views.record_count());

    if let Some(sample) = cache.get(&"article-0".to_string()) {
        println!("  Hottest article  : {} ({}, {} favorites)", sample.title, sample.slug, sample.favorites);
    }
    let recent = views.history(&0);
    println!("  user 0 viewed    : {} articles in the last window", recent.len());
}
