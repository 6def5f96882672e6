//! Plain-data cache configuration.
//!
//! A `CacheConfig` can be deserialized (with the `serde` feature) from any
//! serde format, or parsed from a compact option string:
//!
//! ```
//! use fibre_memo::CacheConfig;
//! use std::time::Duration;
//!
//! let config: CacheConfig = "maximum_size=1000, expire_after_write=10m, record_stats"
//!   .parse()
//!   .unwrap();
//! assert_eq!(config.maximum_size, Some(1000));
//! assert_eq!(config.expire_after_write, Some(Duration::from_secs(600)));
//! assert!(config.record_stats);
//! ```

use crate::error::ConfigError;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for a cache, applied with `CacheBuilder::from_config` or
/// `CacheBuilder::config`. Unset fields keep the builder's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheConfig {
  /// Maximum number of entries. Unbounded when unset.
  pub maximum_size: Option<u64>,
  /// Time after a write at which an entry expires, e.g. `"10m"`.
  #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
  pub expire_after_write: Option<Duration>,
  /// Whether to count hits, misses, loads and evictions.
  pub record_stats: bool,
  /// Number of shards. Chosen from the CPU count when unset.
  pub shards: Option<usize>,
  /// Interval of the background expiry sweep. No sweeper when unset.
  #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
  pub cleanup_interval: Option<Duration>,
}

impl FromStr for CacheConfig {
  type Err = ConfigError;

  /// Parses a comma separated list of `key=value` options. `record_stats`
  /// may be given bare, as a flag.
  fn from_str(options: &str) -> Result<Self, Self::Err> {
    let mut config = CacheConfig::default();
    let mut seen = HashSet::new();

    for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
      let (key, value) = match option.split_once('=') {
        Some((key, value)) => (key.trim(), Some(value.trim())),
        None => (option, None),
      };
      if !seen.insert(key.to_string()) {
        return Err(ConfigError::DuplicateOption(key.to_string()));
      }

      match key {
        "maximum_size" => config.maximum_size = Some(parse_value(key, value)?),
        "shards" => config.shards = Some(parse_value(key, value)?),
        "expire_after_write" => config.expire_after_write = Some(parse_duration(key, value)?),
        "cleanup_interval" => config.cleanup_interval = Some(parse_duration(key, value)?),
        "record_stats" => {
          config.record_stats = match value {
            None => true,
            Some(_) => parse_value(key, value)?,
          }
        }
        _ => return Err(ConfigError::UnknownOption(key.to_string())),
      }
    }

    Ok(config)
  }
}

impl fmt::Display for CacheConfig {
  /// Writes the config back as an option string accepted by `from_str`.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut options = Vec::new();
    if let Some(maximum_size) = self.maximum_size {
      options.push(format!("maximum_size={maximum_size}"));
    }
    if let Some(duration) = self.expire_after_write {
      options.push(format!("expire_after_write={}", humantime::format_duration(duration)));
    }
    if self.record_stats {
      options.push("record_stats".to_string());
    }
    if let Some(shards) = self.shards {
      options.push(format!("shards={shards}"));
    }
    if let Some(interval) = self.cleanup_interval {
      options.push(format!("cleanup_interval={}", humantime::format_duration(interval)));
    }
    f.write_str(&options.join(","))
  }
}

fn require<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
  match value {
    Some(value) if !value.is_empty() => Ok(value),
    _ => Err(ConfigError::MissingValue(key.to_string())),
  }
}

fn parse_value<T>(key: &str, value: Option<&str>) -> Result<T, ConfigError>
where
  T: FromStr,
  T::Err: fmt::Display,
{
  let value = require(key, value)?;
  value.parse().map_err(|error: T::Err| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
    reason: error.to_string(),
  })
}

fn parse_duration(key: &str, value: Option<&str>) -> Result<Duration, ConfigError> {
  let value = require(key, value)?;
  humantime::parse_duration(value).map_err(|error| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
    reason: error.to_string(),
  })
}
