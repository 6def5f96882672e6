use crate::error::{BoxError, LoadError};
use crate::handles::{AsyncCache, Cache};
use crate::stats::CacheStats;

use std::borrow::Borrow;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};

// --- AsyncCache Implementation ---

impl<K, V, H> AsyncCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Converts this asynchronous `AsyncCache` into a synchronous `Cache`.
  /// This is a zero-cost conversion.
  pub fn to_sync(&self) -> Cache<K, V, H> {
    Cache {
      shared: self.shared.clone(),
    }
  }

  /// Returns the value for `key`, computing it with `loader` if it is absent
  /// or expired.
  ///
  /// The load runs as its own task on the cache's spawner (or the current
  /// Tokio runtime for a handle from `Cache::to_async`), so it completes
  /// and is cached even if this future is dropped. Tasks and threads that ask
  /// for the same key meanwhile wait for it instead of loading again. A
  /// panicking loader fails the load with `LoadError::Panicked`.
  pub async fn get_with<F, Fut, E>(&self, key: K, loader: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    self.shared.get_with_async(key, loader).await
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

  /// Returns `true` if a live entry exists for `key`.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.shared.contains_key(key)
  }

  /// Inserts a value, replacing any existing one.
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

  /// Returns the approximate number of entries.
  pub fn size(&self) -> u64 {
    self.shared.size()
  }

  pub fn stats(&self) -> CacheStats {
    self.shared.stats()
  }

  /// Removes every expired entry now. Returns how many were removed.
  pub fn clean_up(&self) -> usize {
    self.shared.clean_up()
  }
}

#[cfg(test)]
mod test {
  use crate::CacheBuilder;
  use std::convert::Infallible;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn sync_and_async_handles_share_entries() {
    let cache = CacheBuilder::<u32, String>::new().build_async().unwrap();
    let loads = Arc::new(AtomicUsize::new(0));

    let counter = loads.clone();
    let value = cache
      .get_with(1, move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>("one".to_string())
      })
      .await
      .unwrap();

    let sync = cache.to_sync();
    let hit = sync
      .get_with(1, || Ok::<_, Infallible>("never".to_string()))
      .unwrap();
    assert!(Arc::ptr_eq(&value, &hit));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    sync.put(2, "two".to_string());
    assert_eq!(cache.get_if_present(&2).as_deref().map(String::as_str), Some("two"));
    assert_eq!(cache.size(), 2);
  }

  #[tokio::test]
  async fn converted_handles_load_on_the_current_runtime() {
    let cache = CacheBuilder::<u32, u32>::new().build().unwrap().to_async();
    let value = cache
      .get_with(3, || async { Ok::<_, Infallible>(9) })
      .await
      .unwrap();
    assert_eq!(*value, 9);
    assert!(cache.contains_key(&3));
  }
}
