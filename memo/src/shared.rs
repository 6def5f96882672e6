use crate::error::{BoxError, LoadError};
use crate::janitor::Janitor;
use crate::listener::{RemovalCause, RemovalNotification};
use crate::loader::{LoadCell, WaitLoad};
use crate::notifier::Notifier;
use crate::policy::Policy;
use crate::runtime::{self, TaskSpawner};
use crate::stats::{CacheStats, StatsCounter};
use crate::store::{InFlight, Lookup, Shard, ShardedStore};
use crate::time::Ticker;

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use generational_arena::Index;
use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

/// How a `get_with` call proceeds after consulting the store.
enum Begin<V> {
  Hit(Arc<V>),
  /// Another caller is already loading the key.
  Join(Arc<LoadCell<V>>),
  /// This caller registered the load and must run the loader.
  Lead(Arc<LoadCell<V>>),
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: ShardedStore<K, V, H>,
  pub(crate) policy: Policy,
  pub(crate) stats: StatsCounter,
  pub(crate) notifier: Notifier<K, V>,
  pub(crate) ticker: Arc<dyn Ticker>,
  pub(crate) spawner: Option<Arc<dyn TaskSpawner>>,
  pub(crate) janitor: OnceCell<Janitor>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("policy", &self.policy)
      .field("store", &self.store)
      .field("has_listener", &self.notifier.is_enabled())
      .field("has_janitor", &self.janitor.get().is_some())
      .field("stats", &self.stats.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get() {
      janitor.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn new(
    store: ShardedStore<K, V, H>,
    policy: Policy,
    stats: StatsCounter,
    notifier: Notifier<K, V>,
    ticker: Arc<dyn Ticker>,
    spawner: Option<Arc<dyn TaskSpawner>>,
  ) -> Self {
    Self {
      store,
      policy,
      stats,
      notifier,
      ticker,
      spawner,
      janitor: OnceCell::new(),
    }
  }

  #[inline]
  pub(crate) fn now(&self) -> u64 {
    self.ticker.read()
  }

  pub(crate) fn stats(&self) -> CacheStats {
    self.stats.snapshot()
  }

  pub(crate) fn size(&self) -> u64 {
    self.policy.entry_count()
  }

  /// Returns the live value for `key`, recording a hit or a miss.
  pub(crate) fn get_if_present<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let now = self.now();
    let lookup = self.store.lock(key).lookup(key, now, &self.policy);
    match lookup {
      Lookup::Hit(value) => {
        self.stats.record_hit();
        Some(value)
      }
      Lookup::Expired(notification) => {
        self.stats.record_miss();
        self.finish_removals(vec![notification]);
        None
      }
      Lookup::Absent => {
        self.stats.record_miss();
        None
      }
    }
  }

  /// Returns `true` if a live entry exists. Records nothing.
  pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let now = self.now();
    self.store.lock(key).contains(key, now, &self.policy)
  }

  /// Consults the store and, on a miss, joins or registers the key's load.
  fn begin_load(&self, key: &K) -> Begin<V> {
    let now = self.now();
    let mut expired = None;
    let begin = {
      let mut shard = self.store.lock(key);
      match shard.lookup(key, now, &self.policy) {
        Lookup::Hit(value) => Begin::Hit(value),
        lookup => {
          if let Lookup::Expired(notification) = lookup {
            expired = Some(notification);
          }
          match shard.pending.get(key) {
            Some(in_flight) => Begin::Join(in_flight.cell.clone()),
            None => {
              let cell = Arc::new(LoadCell::new());
              shard
                .pending
                .insert(key.clone(), InFlight::new(cell.clone()));
              Begin::Lead(cell)
            }
          }
        }
      }
    };

    match &begin {
      Begin::Hit(_) => self.stats.record_hit(),
      Begin::Join(_) => {
        trace!("joining in-flight load");
        self.stats.record_miss();
      }
      Begin::Lead(_) => self.stats.record_miss(),
    }
    if let Some(notification) = expired {
      self.finish_removals(vec![notification]);
    }
    begin
  }

  /// Returns the cached value for `key`, running `loader` on a miss.
  ///
  /// Concurrent callers for the same missing key share one run of the loader.
  /// A panicking loader fails the load for every waiter with
  /// `LoadError::Panicked`, then the panic continues on this thread.
  pub(crate) fn get_with<F, E>(self: &Arc<Self>, key: K, loader: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
  {
    let cell = match self.begin_load(&key) {
      Begin::Hit(value) => return Ok(value),
      Begin::Join(cell) => return cell.wait(),
      Begin::Lead(cell) => cell,
    };

    let guard = LoadGuard::new(self.clone(), key, cell, LoadError::Panicked);
    match loader() {
      Ok(value) => Ok(guard.succeed(Arc::new(value))),
      Err(error) => Err(guard.fail(LoadError::failed(error))),
    }
  }

  /// The asynchronous form of `get_with`.
  ///
  /// The load runs as its own task, on the configured spawner or else on the
  /// Tokio runtime polling this future, and completes even if this future is
  /// dropped. Only with neither available does it run inline, where dropping
  /// this future abandons the load.
  pub(crate) async fn get_with_async<F, Fut, E>(
    self: &Arc<Self>,
    key: K,
    loader: F,
  ) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    let cell = match self.begin_load(&key) {
      Begin::Hit(value) => return Ok(value),
      Begin::Join(cell) => return WaitLoad::new(cell).await,
      Begin::Lead(cell) => cell,
    };

    let load = Box::pin(self.async_load(key, cell.clone(), loader));
    if let Some(spawner) = &self.spawner {
      spawner.spawn(load);
    } else if let Some(spawner) = runtime::current_spawner() {
      spawner.spawn(load);
    } else {
      load.await;
    }
    WaitLoad::new(cell).await
  }

  // The guard is created before the future is first polled, so a load whose
  // task is dropped unpolled still fails its waiters.
  fn async_load<F, Fut, E>(
    self: &Arc<Self>,
    key: K,
    cell: Arc<LoadCell<V>>,
    loader: F,
  ) -> impl Future<Output = ()> + Send + 'static
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    let guard = LoadGuard::new(self.clone(), key, cell, LoadError::Abandoned);
    async move {
      let outcome = AssertUnwindSafe(async move { loader().await })
        .catch_unwind()
        .await;
      match outcome {
        Ok(Ok(value)) => {
          guard.succeed(Arc::new(value));
        }
        Ok(Err(error)) => {
          guard.fail(LoadError::failed(error));
        }
        Err(_) => {
          guard.fail(LoadError::Panicked);
        }
      }
    }
  }

  /// Loads a fresh value for a present key and replaces the cached one.
  ///
  /// The reload is registered as the key's in-flight load, so a concurrent
  /// refresh, or a miss after the entry is removed, joins it instead of
  /// loading again. Readers keep seeing the old value until the new one is
  /// admitted. On failure the old value stays. An absent key is loaded as by
  /// `get_with`.
  pub(crate) fn refresh<F, E>(self: &Arc<Self>, key: K, loader: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
  {
    let cell = match self.begin_refresh(&key) {
      Some(Begin::Lead(cell)) => cell,
      Some(Begin::Join(cell)) => return cell.wait(),
      Some(Begin::Hit(value)) => return Ok(value),
      None => return self.get_with(key, loader),
    };

    trace!("refreshing cached value");
    let guard = LoadGuard::new(self.clone(), key, cell, LoadError::Panicked);
    match loader() {
      Ok(value) => Ok(guard.succeed(Arc::new(value))),
      Err(error) => Err(guard.fail(LoadError::failed(error))),
    }
  }

  /// Registers a reload of a live entry, or joins the one already running.
  /// Returns `None` when the key has no live entry. Records no request.
  fn begin_refresh(&self, key: &K) -> Option<Begin<V>> {
    let now = self.now();
    let mut shard = self.store.lock(key);
    if !shard.contains(key, now, &self.policy) {
      return None;
    }
    let begin = match shard.pending.get(key) {
      Some(in_flight) => Begin::Join(in_flight.cell.clone()),
      None => {
        let cell = Arc::new(LoadCell::new());
        shard
          .pending
          .insert(key.clone(), InFlight::new(cell.clone()));
        Begin::Lead(cell)
      }
    };
    Some(begin)
  }

  /// Publishes a successful load and admits the value, unless the load was
  /// invalidated or superseded by a `put` while it ran.
  fn complete_load(&self, key: &K, cell: &Arc<LoadCell<V>>, value: Arc<V>, load_time: Duration) {
    self.stats.record_load_success(load_time);
    trace!(?load_time, "value loaded");

    let now = self.now();
    let shard_index = self.store.shard_index(key);
    let mut removals = Vec::new();
    {
      let mut shard = self.store.lock_index(shard_index);
      let owner = shard
        .pending
        .get(key)
        .filter(|in_flight| Arc::ptr_eq(&in_flight.cell, cell))
        .map(|in_flight| in_flight.invalidated);
      match owner {
        Some(false) => {
          shard.pending.remove(key);
          self.admit(&mut shard, key.clone(), value.clone(), now, &mut removals);
        }
        Some(true) => {
          shard.pending.remove(key);
          removals.push(RemovalNotification::new(
            key.clone(),
            value.clone(),
            RemovalCause::Explicit,
          ));
        }
        None => {
          removals.push(RemovalNotification::new(
            key.clone(),
            value.clone(),
            RemovalCause::Replaced,
          ));
        }
      }
    }
    self.evict_from_other_shards(shard_index, &mut removals);

    cell.complete(Ok(value));
    self.finish_removals(removals);
  }

  /// Publishes a failed load. Nothing is cached.
  fn fail_load(&self, key: &K, cell: &Arc<LoadCell<V>>, error: LoadError, load_time: Duration) {
    self.stats.record_load_exception(load_time);
    warn!(%error, ?load_time, "cache load failed");

    {
      let mut shard = self.store.lock(key);
      let owned = shard
        .pending
        .get(key)
        .is_some_and(|in_flight| Arc::ptr_eq(&in_flight.cell, cell));
      if owned {
        shard.pending.remove(key);
      }
    }
    cell.complete(Err(error));
  }

  /// Inserts a value, replacing any entry and detaching any in-flight load.
  pub(crate) fn put(&self, key: K, value: Arc<V>) {
    let now = self.now();
    let shard_index = self.store.shard_index(&key);
    let mut removals = Vec::new();
    {
      let mut shard = self.store.lock_index(shard_index);
      shard.pending.remove(&key);
      self.admit(&mut shard, key, value, now, &mut removals);
    }
    self.evict_from_other_shards(shard_index, &mut removals);
    self.finish_removals(removals);
  }

  /// Inserts into a locked shard, then evicts from the same shard while the
  /// cache is over capacity. The admitted entry itself is never the victim.
  fn admit(
    &self,
    shard: &mut Shard<K, V, H>,
    key: K,
    value: Arc<V>,
    now: u64,
    removals: &mut Vec<RemovalNotification<K, V>>,
  ) {
    let (node, replaced) = shard.insert(key, value, now, &self.policy);
    match replaced {
      Some(notification) => removals.push(notification),
      None => {
        self.policy.record_admission();
        self.evict_while_over_capacity(shard, Some(node), removals);
      }
    }
  }

  fn evict_while_over_capacity(
    &self,
    shard: &mut Shard<K, V, H>,
    protect: Option<Index>,
    removals: &mut Vec<RemovalNotification<K, V>>,
  ) {
    while self.policy.claim_eviction() {
      match shard.evict_lru(protect) {
        Some((key, value)) => {
          removals.push(RemovalNotification::new(key, value, RemovalCause::Size))
        }
        None => {
          self.policy.release_claim();
          break;
        }
      }
    }
  }

  /// Evicts from the shards after `origin` when the origin shard alone could
  /// not bring the cache back under its bound.
  fn evict_from_other_shards(
    &self,
    origin: usize,
    removals: &mut Vec<RemovalNotification<K, V>>,
  ) {
    let num_shards = self.store.num_shards();
    for offset in 1..num_shards {
      if !self.policy.is_over_capacity() {
        break;
      }
      let mut shard = self.store.lock_index((origin + offset) & (num_shards - 1));
      self.evict_while_over_capacity(&mut shard, None, removals);
    }
  }

  /// Removes `key`. Returns `true` if an entry was removed.
  ///
  /// An in-flight load for the key still completes for its callers, but its
  /// value is not admitted.
  pub(crate) fn invalidate<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let removed = {
      let mut shard = self.store.lock(key);
      if let Some(in_flight) = shard.pending.get_mut(key) {
        in_flight.invalidated = true;
      }
      shard.remove(key, &self.policy)
    };

    match removed {
      Some((key, value)) => {
        self.finish_removals(vec![RemovalNotification::new(
          key,
          value,
          RemovalCause::Explicit,
        )]);
        true
      }
      None => false,
    }
  }

  pub(crate) fn invalidate_all(&self) {
    let mut removals = Vec::new();
    for shard in self.store.iter_shards() {
      let drained = shard.lock().drain(&self.policy);
      removals.extend(
        drained
          .into_iter()
          .map(|(key, value)| RemovalNotification::new(key, value, RemovalCause::Explicit)),
      );
    }
    self.finish_removals(removals);
  }

  /// Removes every expired entry now. Returns how many were removed.
  pub(crate) fn clean_up(&self) -> usize {
    if !self.policy.expires() {
      return 0;
    }

    let now = self.now();
    let mut removals = Vec::new();
    for shard in self.store.iter_shards() {
      let expired = shard.lock().drain_expired(now, &self.policy);
      removals.extend(
        expired
          .into_iter()
          .map(|(key, value)| RemovalNotification::new(key, value, RemovalCause::Expired)),
      );
    }
    let swept = removals.len();
    self.finish_removals(removals);
    swept
  }

  /// Counts evictions and delivers notifications. Must be called with no
  /// shard lock held.
  fn finish_removals(&self, removals: Vec<RemovalNotification<K, V>>) {
    for notification in removals {
      if notification.was_evicted() {
        self.stats.record_eviction();
        debug!(cause = %notification.cause(), "cache entry evicted");
      }
      self.notifier.notify(notification);
    }
  }
}

/// Owns the leader's side of a load.
///
/// A guard that is dropped without `succeed` or `fail` (the loader panicked,
/// or the async load was dropped) fails the load with its `on_drop` error, so
/// waiters are never left parked.
struct LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  shared: Arc<CacheShared<K, V, H>>,
  key: K,
  cell: Arc<LoadCell<V>>,
  started: u64,
  on_drop: LoadError,
  finished: bool,
}

impl<K, V, H> LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn new(
    shared: Arc<CacheShared<K, V, H>>,
    key: K,
    cell: Arc<LoadCell<V>>,
    on_drop: LoadError,
  ) -> Self {
    trace!("loading value");
    let started = shared.now();
    Self {
      shared,
      key,
      cell,
      started,
      on_drop,
      finished: false,
    }
  }

  fn elapsed(&self) -> Duration {
    Duration::from_nanos(self.shared.now().saturating_sub(self.started))
  }

  fn succeed(mut self, value: Arc<V>) -> Arc<V> {
    self.finished = true;
    let load_time = self.elapsed();
    self
      .shared
      .complete_load(&self.key, &self.cell, value.clone(), load_time);
    value
  }

  fn fail(mut self, error: LoadError) -> LoadError {
    self.finished = true;
    let load_time = self.elapsed();
    self
      .shared
      .fail_load(&self.key, &self.cell, error.clone(), load_time);
    error
  }
}

impl<K, V, H> Drop for LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    let load_time = self.elapsed();
    self
      .shared
      .fail_load(&self.key, &self.cell, self.on_drop.clone(), load_time);
  }
}
