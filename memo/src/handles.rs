mod futures;
mod sync;

use crate::error::BoxError;
use crate::shared::CacheShared;

use std::fmt;
use std::sync::Arc;

/// A thread-safe, synchronous cache.
///
/// Handles are cheap to clone; every clone shares the same entries,
/// statistics and listener.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

/// A thread-safe, asynchronous cache.
pub struct AsyncCache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

pub(crate) type DefaultLoader<K, V> = dyn Fn(&K) -> Result<V, BoxError> + Send + Sync;

/// A `Cache` bundled with the loader that computes its missing values.
///
/// Dereferences to the underlying `Cache`, so every `Cache` method is
/// available as well.
pub struct LoadingCache<K, V, H = ahash::RandomState> {
  pub(crate) cache: Cache<K, V, H>,
  pub(crate) loader: Arc<DefaultLoader<K, V>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> Clone for AsyncCache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> Clone for LoadingCache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      loader: self.loader.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> fmt::Debug for AsyncCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<K, V, H> fmt::Debug for LoadingCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadingCache")
      .field("cache", &self.cache)
      .finish_non_exhaustive()
  }
}
