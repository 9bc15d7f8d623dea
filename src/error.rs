use thiserror::Error;

/// Errors raised while loading a [`CacheConfig`](crate::config::CacheConfig).
///
/// Store operations themselves never fail; configuration is the only
/// fallible surface of the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid duration {value:?} (expected e.g. 500ms, 30s, 5m, 1h)")]
    InvalidDuration { var: String, value: String },
    #[error("{var}: invalid number {value:?}")]
    InvalidNumber { var: String, value: String },
    #[error("{var}: shard count must be a non-zero power of two, got {value}")]
    InvalidShardCount { var: String, value: usize },
    #[error("{var}: interval must be greater than zero")]
    ZeroInterval { var: String },
}
