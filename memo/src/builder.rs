use crate::config::CacheConfig;
use crate::error::{BoxError, BuildError};
use crate::handles::{AsyncCache, Cache, LoadingCache};
use crate::janitor::Janitor;
use crate::listener::RemovalListener;
use crate::notifier::Notifier;
use crate::policy::Policy;
use crate::shared::CacheShared;
use crate::stats::StatsCounter;
use crate::store::ShardedStore;
use crate::time::{SystemTicker, Ticker};
use crate::TaskSpawner;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// Below this many entries per shard, a bounded cache uses fewer shards so
/// that eviction stays close to a global LRU.
const MIN_ENTRIES_PER_SHARD: u64 = 16;

/// The largest shard count a cache accepts.
const MAX_SHARDS: usize = 1 << 16;

/// A builder for creating `Cache`, `LoadingCache` and `AsyncCache` instances.
///
/// ```
/// use fibre_memo::CacheBuilder;
/// use std::time::Duration;
///
/// let cache = CacheBuilder::<u64, String>::new()
///   .maximum_size(1_000)
///   .expire_after_write(Duration::from_secs(600))
///   .record_stats()
///   .build()
///   .unwrap();
///
/// let graph = cache.get_with(7, || Ok::<_, std::io::Error>("seven".to_string())).unwrap();
/// assert_eq!(*graph, "seven");
/// ```
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  maximum_size: Option<u64>,
  expire_after_write: Option<Duration>,
  record_stats: bool,
  shards: Option<usize>,
  hasher: H,
  ticker: Option<Arc<dyn Ticker>>,
  cleanup_interval: Option<Duration>,
  listener: Option<Arc<dyn RemovalListener<K, V>>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("maximum_size", &self.maximum_size)
      .field("expire_after_write", &self.expire_after_write)
      .field("record_stats", &self.record_stats)
      .field("shards", &self.shards)
      .field("cleanup_interval", &self.cleanup_interval)
      .field("has_listener", &self.listener.is_some())
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Bounds the cache to at most `maximum_size` entries. When a new key would
  /// exceed the bound, the least recently used entry is evicted.
  ///
  /// Recency is tracked per shard: the victim is the least recently used
  /// entry of the new key's shard, falling back to other shards when that one
  /// has nothing else to evict. Small bounded caches default to a single
  /// shard, which makes eviction an exact LRU. Unbounded by default.
  pub fn maximum_size(mut self, maximum_size: u64) -> Self {
    self.maximum_size = Some(maximum_size);
    self
  }

  /// Expires each entry once this much time has passed since it was written.
  pub fn expire_after_write(mut self, duration: Duration) -> Self {
    self.expire_after_write = Some(duration);
    self
  }

  /// Enables hit, miss, load and eviction counting. Off by default, in which
  /// case `stats()` always returns zeros.
  pub fn record_stats(mut self) -> Self {
    self.record_stats = true;
    self
  }

  /// Sets the listener that is told about every entry leaving the cache.
  pub fn removal_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: RemovalListener<K, V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Sets the number of concurrent shards to use. Rounded up to a power of
  /// two. At most 65536.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = Some(shards);
    self
  }

  /// Replaces the clock used for expiry and load timing.
  pub fn ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
    self.ticker = Some(ticker);
    self
  }

  /// Starts a background thread that sweeps expired entries at this interval.
  /// Without it, expired entries are removed when looked up or on `clean_up`.
  pub fn cleanup_interval(mut self, interval: Duration) -> Self {
    self.cleanup_interval = Some(interval);
    self
  }

  /// Sets the spawner used by `AsyncCache` to run loads.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Applies every option set in `config`, leaving the others untouched.
  pub fn config(mut self, config: &CacheConfig) -> Self {
    if let Some(maximum_size) = config.maximum_size {
      self.maximum_size = Some(maximum_size);
    }
    if let Some(duration) = config.expire_after_write {
      self.expire_after_write = Some(duration);
    }
    if config.record_stats {
      self.record_stats = true;
    }
    if let Some(shards) = config.shards {
      self.shards = Some(shards);
    }
    if let Some(interval) = config.cleanup_interval {
      self.cleanup_interval = Some(interval);
    }
    self
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.maximum_size == Some(0) {
      return Err(BuildError::ZeroMaximumSize);
    }
    if self.expire_after_write == Some(Duration::ZERO) {
      return Err(BuildError::ZeroExpiry);
    }
    if self.cleanup_interval == Some(Duration::ZERO) {
      return Err(BuildError::ZeroCleanupInterval);
    }
    match self.shards {
      Some(0) => return Err(BuildError::ZeroShards),
      Some(requested) if requested > MAX_SHARDS => {
        return Err(BuildError::TooManyShards {
          requested,
          max: MAX_SHARDS,
        })
      }
      _ => {}
    }
    Ok(())
  }

  fn shard_count(&self) -> usize {
    if let Some(shards) = self.shards {
      return shards.next_power_of_two();
    }

    let mut shards = (num_cpus::get() * 4).max(1).next_power_of_two();
    if let Some(maximum_size) = self.maximum_size {
      while shards > 1 && (shards as u64).saturating_mul(MIN_ENTRIES_PER_SHARD) > maximum_size {
        shards /= 2;
      }
    }
    shards
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings: unbounded, no
  /// expiry, no stats, no listener.
  pub fn new() -> Self {
    Self {
      maximum_size: None,
      expire_after_write: None,
      record_stats: false,
      shards: None,
      hasher: H::default(),
      ticker: None,
      cleanup_interval: None,
      listener: None,
      spawner: None,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V> CacheBuilder<K, V, ahash::RandomState> {
  /// Creates a builder preconfigured from `config`.
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new().config(config)
  }
}

// --- Build Methods ---
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets the hasher for the cache.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  /// Builds a synchronous `Cache`.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;
    let shared = self.build_shared_core(None)?;
    Ok(Cache { shared })
  }

  /// Builds a `LoadingCache` that computes missing values with `loader`.
  pub fn build_with_loader<F, E>(self, loader: F) -> Result<LoadingCache<K, V, H>, BuildError>
  where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    let cache = self.build()?;
    Ok(LoadingCache::new(cache, move |key: &K| {
      loader(key).map_err(Into::into)
    }))
  }

  /// Builds an asynchronous `AsyncCache`.
  ///
  /// Loads are spawned on the configured spawner, or on the current Tokio
  /// runtime when none is set.
  pub fn build_async(mut self) -> Result<AsyncCache<K, V, H>, BuildError> {
    self.validate()?;
    let spawner = match self.spawner.take() {
      Some(spawner) => spawner,
      None => Self::default_spawner()?,
    };
    let shared = self.build_shared_core(Some(spawner))?;
    Ok(AsyncCache { shared })
  }

  #[cfg(feature = "tokio")]
  fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
    match crate::runtime::TokioSpawner::current() {
      Some(spawner) => Ok(Arc::new(spawner)),
      None => Err(BuildError::SpawnerRequired),
    }
  }

  #[cfg(not(feature = "tokio"))]
  fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
    Err(BuildError::SpawnerRequired)
  }

  /// Central logic to construct the shared core of the cache.
  fn build_shared_core(
    self,
    spawner: Option<Arc<dyn TaskSpawner>>,
  ) -> Result<Arc<CacheShared<K, V, H>>, BuildError> {
    let store = ShardedStore::new(self.shard_count(), self.hasher.clone());
    let policy = Policy::new(self.maximum_size, self.expire_after_write);
    let ticker = self
      .ticker
      .unwrap_or_else(|| Arc::new(SystemTicker) as Arc<dyn Ticker>);

    let shared = Arc::new(CacheShared::new(
      store,
      policy,
      StatsCounter::new(self.record_stats),
      Notifier::new(self.listener),
      ticker,
      spawner,
    ));

    if let Some(interval) = self.cleanup_interval {
      let janitor = Janitor::spawn(Arc::downgrade(&shared), interval)
        .map_err(|error| BuildError::JanitorSpawn(error.to_string()))?;
      let _ = shared.janitor.set(janitor);
    }

    Ok(shared)
  }
}
