mod activity;
mod builder;
mod cache;
mod store;
mod metrics;
pub mod clock;
pub mod config;
pub mod error;
pub mod evictor;
pub mod listener;

pub use activity::{ActivityLog, ViewRecord};
pub use builder::{ActivityLogBuilder, SnapshotCacheBuilder};
pub use cache::SnapshotCache;
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::CacheConfig;
pub use error::ConfigError;
pub use evictor::{Evictor, Sweep};
pub use metrics::stats::Metrics;
