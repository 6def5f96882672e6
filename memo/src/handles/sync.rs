use crate::error::{BoxError, LoadError};
use crate::handles::{AsyncCache, Cache, LoadingCache};
use crate::stats::CacheStats;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::ops::Deref;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Converts this synchronous `Cache` into an asynchronous `AsyncCache`.
  ///
  /// The two handles share everything. Loads started through the returned
  /// handle run on the spawner configured at build time, or else on the Tokio
  /// runtime that polls them, so a dropped caller never cancels a load.
  pub fn to_async(&self) -> AsyncCache<K, V, H> {
    AsyncCache {
      shared: self.shared.clone(),
    }
  }

  /// Returns the value for `key`, computing it with `loader` if it is absent
  /// or expired.
  ///
  /// If another thread is already loading the same key, this call waits for
  /// that load and returns its result instead of running `loader`. A failed
  /// load caches nothing, so the next call tries again.
  ///
  /// # Panics
  ///
  /// If `loader` panics, every caller waiting on this load gets
  /// `LoadError::Panicked` and the panic is resumed on this thread.
  pub fn get_with<F, E>(&self, key: K, loader: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
  {
    self.shared.get_with(key, loader)
  }

  /// Returns the value for `key` if it is cached and live. Never loads.
  pub fn get_if_present<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.get_if_present(key)
  }

  /// Returns the cached values for those of `keys` that are present.
  ///
  /// Every key counts as a hit or a miss.
  pub fn get_all_present<I>(&self, keys: I) -> HashMap<K, Arc<V>>
  where
    I: IntoIterator<Item = K>,
  {
    let mut found = HashMap::new();
    for key in keys {
      if let Some(value) = self.shared.get_if_present(&key) {
        found.insert(key, value);
      }
    }
    found
  }

  /// Returns `true` if a live entry exists for `key`. Does not count as a
  /// request and does not affect eviction order.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.contains_key(key)
  }

  /// Inserts a value, replacing any existing one.
  ///
  /// The replaced value is reported to the removal listener with cause
  /// `Replaced` before this returns.
  pub fn put(&self, key: K, value: V) {
    self.shared.put(key, Arc::new(value));
  }

  /// Inserts every pair from `entries`.
  pub fn put_all<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    for (key, value) in entries {
      self.shared.put(key, Arc::new(value));
    }
  }

  /// Removes the entry for `key`. Returns `true` if one was removed.
  pub fn invalidate<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.invalidate(key)
  }

  /// Removes the entries for all of `keys`.
  pub fn invalidate_many<I, Q>(&self, keys: I)
  where
    I: IntoIterator<Item = Q>,
    K: Borrow<Q>,
    Q: Hash + Eq,
  {
    for key in keys {
      self.shared.invalidate(&key);
    }
  }

  /// Removes every entry.
  pub fn invalidate_all(&self) {
    self.shared.invalidate_all();
  }

  /// Returns the approximate number of entries. Expired entries that have not
  /// been cleaned up yet are included.
  pub fn size(&self) -> u64 {
    self.shared.size()
  }

  /// Returns a snapshot of the cache's statistics.
  pub fn stats(&self) -> CacheStats {
    self.shared.stats()
  }

  /// Removes every expired entry now. Returns how many were removed.
  pub fn clean_up(&self) -> usize {
    self.shared.clean_up()
  }
}

impl<K, V, H> LoadingCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn new<F>(cache: Cache<K, V, H>, loader: F) -> Self
  where
    F: Fn(&K) -> Result<V, BoxError> + Send + Sync + 'static,
  {
    Self {
      cache,
      loader: Arc::new(loader),
    }
  }

  /// Returns the value for `key`, loading it with the cache's loader if it
  /// is absent.
  pub fn get(&self, key: K) -> Result<Arc<V>, LoadError> {
    let loader = self.loader.clone();
    let load_key = key.clone();
    self.cache.get_with(key, move || loader(&load_key))
  }

  /// Returns the values for all of `keys`, loading the absent ones.
  ///
  /// Stops at the first key that fails to load.
  pub fn get_all<I>(&self, keys: I) -> Result<HashMap<K, Arc<V>>, LoadError>
  where
    I: IntoIterator<Item = K>,
  {
    let mut values = HashMap::new();
    for key in keys {
      let value = self.get(key.clone())?;
      values.insert(key, value);
    }
    Ok(values)
  }

  /// Loads a new value for `key` and caches it.
  ///
  /// While the new value loads, readers keep getting the old one. If the load
  /// fails, the old value stays cached and the error is returned.
  pub fn refresh(&self, key: K) -> Result<Arc<V>, LoadError> {
    let loader = self.loader.clone();
    let load_key = key.clone();
    self.cache.shared.refresh(key, move || loader(&load_key))
  }

  /// Returns the underlying `Cache`.
  pub fn cache(&self) -> &Cache<K, V, H> {
    &self.cache
  }
}

impl<K, V, H> Deref for LoadingCache<K, V, H> {
  type Target = Cache<K, V, H>;

  fn deref(&self) -> &Self::Target {
    &self.cache
  }
}
