use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_RETENTION_WINDOW: &str = "VIEWCACHE_RETENTION_WINDOW";
pub const ENV_SWEEP_INTERVAL: &str = "VIEWCACHE_SWEEP_INTERVAL";
pub const ENV_SHARDS: &str = "VIEWCACHE_SHARDS";
pub const ENV_SNAPSHOT_CAPACITY: &str = "VIEWCACHE_SNAPSHOT_CAPACITY";
pub const ENV_ACTIVITY_CAPACITY: &str = "VIEWCACHE_ACTIVITY_CAPACITY";

/// Tunables shared by the snapshot cache, the activity log and the evictor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum age an entry or view record may reach before a sweep drops it.
    pub retention_window: Duration,
    /// How often the evictor sweeps.
    pub sweep_interval: Duration,
    /// Shards per store.  Must be a power of two.
    pub num_shards: usize,
    /// Optional cap on cached snapshots, enforced after each sweep.
    pub snapshot_capacity: Option<usize>,
    /// Optional cap on users tracked by the activity log.
    pub activity_capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_window: Duration::from_secs(30 * 60), // 30 minutes
            sweep_interval: Duration::from_secs(5 * 60),    // 5 minutes
            num_shards: 64,
            snapshot_capacity: None,
            activity_capacity: None,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_RETENTION_WINDOW) {
            config.retention_window = parse_duration(ENV_RETENTION_WINDOW, &val)?;
        }
        if let Some(val) = lookup(ENV_SWEEP_INTERVAL) {
            config.sweep_interval = parse_duration(ENV_SWEEP_INTERVAL, &val)?;
        }
        if let Some(val) = lookup(ENV_SHARDS) {
            config.num_shards = parse_number(ENV_SHARDS, &val)?;
        }
        if let Some(val) = lookup(ENV_SNAPSHOT_CAPACITY) {
            config.snapshot_capacity = Some(parse_number(ENV_SNAPSHOT_CAPACITY, &val)?);
        }
        if let Some(val) = lookup(ENV_ACTIVITY_CAPACITY) {
            config.activity_capacity = Some(parse_number(ENV_ACTIVITY_CAPACITY, &val)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                var: ENV_SWEEP_INTERVAL.to_string(),
            });
        }
        if !self.num_shards.is_power_of_two() {
            return Err(ConfigError::InvalidShardCount {
                var: ENV_SHARDS.to_string(),
                value: self.num_shards,
            });
        }
        for (var, cap) in [
            (ENV_SNAPSHOT_CAPACITY, self.snapshot_capacity),
            (ENV_ACTIVITY_CAPACITY, self.activity_capacity),
        ] {
            if cap == Some(0) {
                return Err(ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_number(var: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Parse a duration string like "500ms", "15s", "30m", "1h".  A bare number
/// is taken as seconds.
pub fn parse_duration(var: &str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        var: var.to_string(),
        value: value.to_string(),
    };

    let s = value.trim();
    let (num_str, unit_secs): (&str, Option<u64>) = if let Some(n) = s.strip_suffix("ms") {
        (n, None)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, Some(1))
    } else if let Some(n) = s.strip_suffix('m') {
        (n, Some(60))
    } else if let Some(n) = s.strip_suffix('h') {
        (n, Some(3600))
    } else {
        (s, Some(1))
    };

    let num: u64 = num_str.trim().parse().map_err(|_| invalid())?;
    match unit_secs {
        None => Ok(Duration::from_millis(num)),
        Some(mult) => num
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = CacheConfig::default();
        assert_eq!(config.retention_window, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.num_shards, 64);
        assert_eq!(config.snapshot_capacity, None);
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = CacheConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = CacheConfig::from_lookup(lookup(&[
            (ENV_RETENTION_WINDOW, "1h"),
            (ENV_SWEEP_INTERVAL, "90s"),
            (ENV_SHARDS, "16"),
            (ENV_SNAPSHOT_CAPACITY, "1000"),
            (ENV_ACTIVITY_CAPACITY, "10000"),
        ]))
        .unwrap();
        assert_eq!(config.retention_window, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(90));
        assert_eq!(config.num_shards, 16);
        assert_eq!(config.snapshot_capacity, Some(1000));
        assert_eq!(config.activity_capacity, Some(10000));
    }

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("x", "250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("x", "45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("x", " 5m ").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("x", "").is_err());
        assert!(parse_duration("x", "soon").is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let err = CacheConfig::from_lookup(lookup(&[(ENV_SHARDS, "12")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidShardCount {
                var: ENV_SHARDS.to_string(),
                value: 12
            }
        );

        let err = CacheConfig::from_lookup(lookup(&[(ENV_SWEEP_INTERVAL, "0s")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { .. }));

        let err =
            CacheConfig::from_lookup(lookup(&[(ENV_SNAPSHOT_CAPACITY, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }
}
