use std::error::Error;
use std::sync::Arc;

/// A type-erased error returned by loaders and removal listeners.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
  /// A bounded cache was configured with a maximum size of zero.
  /// Leave `maximum_size` unset for an unbounded cache.
  #[error("maximum size cannot be zero")]
  ZeroMaximumSize,
  /// `expire_after_write` was configured with a zero duration.
  #[error("expire-after-write duration cannot be zero")]
  ZeroExpiry,
  /// The background clean-up interval was configured with a zero duration.
  #[error("clean-up interval cannot be zero")]
  ZeroCleanupInterval,
  /// The cache was configured with zero shards.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// The cache was configured with more shards than it supports.
  #[error("shard count {requested} exceeds the maximum of {max}")]
  TooManyShards { requested: usize, max: usize },
  /// An async cache was requested, but no `TaskSpawner` was configured and
  /// no Tokio runtime was available to spawn loads on.
  #[error("an async cache requires a task spawner or a running Tokio runtime")]
  SpawnerRequired,
  /// The background clean-up thread could not be started.
  #[error("failed to spawn the cache janitor thread: {0}")]
  JanitorSpawn(String),
}

/// Errors produced while parsing a textual cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  #[error("unknown cache option `{0}`")]
  UnknownOption(String),
  #[error("cache option `{0}` was given more than once")]
  DuplicateOption(String),
  #[error("cache option `{0}` expects a value")]
  MissingValue(String),
  #[error("invalid value `{value}` for cache option `{key}`: {reason}")]
  InvalidValue {
    key: String,
    value: String,
    reason: String,
  },
}

/// The error returned by `get_with` and friends when a value could not be
/// loaded.
///
/// The same logical failure is handed to the caller that ran the loader and to
/// every caller that joined its in-flight load, each through its own
/// `LoadError` value. Nothing is cached on failure, so the next request for
/// the key runs the loader again.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
  /// The loader returned an error.
  #[error("cache loader failed: {0}")]
  Failed(#[source] Arc<dyn Error + Send + Sync>),
  /// The loader panicked.
  #[error("cache loader panicked")]
  Panicked,
  /// The load was dropped before it produced a value, e.g. because the
  /// runtime driving it shut down.
  #[error("cache load was abandoned before completing")]
  Abandoned,
}

impl LoadError {
  pub(crate) fn failed(error: impl Into<BoxError>) -> Self {
    LoadError::Failed(Arc::from(error.into()))
  }

  /// Returns the loader's own error, if this load failed with one.
  pub fn loader_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
    match self {
      LoadError::Failed(error) => Some(error.as_ref()),
      LoadError::Panicked | LoadError::Abandoned => None,
    }
  }
}

/// A failure raised by a removal listener.
///
/// Listener failures never reach the cache caller. They are logged and then
/// dropped.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
  #[error("removal listener failed: {0}")]
  Failed(#[source] BoxError),
  #[error("removal listener panicked: {0}")]
  Panicked(String),
}
