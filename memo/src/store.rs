use crate::entry::CacheEntry;
use crate::listener::{RemovalCause, RemovalNotification};
use crate::loader::LoadCell;
use crate::policy::access_order::AccessOrder;
use crate::policy::Policy;

use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use generational_arena::Index;
use parking_lot::{Mutex, MutexGuard};

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<Q: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &Q) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// An in-flight load registered for a missing key, or for a live key that is
/// being refreshed.
pub(crate) struct InFlight<V> {
  pub(crate) cell: Arc<LoadCell<V>>,
  /// Set when the key is invalidated while the load is running. The load
  /// still completes for its callers, but its value is not admitted.
  pub(crate) invalidated: bool,
}

impl<V> InFlight<V> {
  pub(crate) fn new(cell: Arc<LoadCell<V>>) -> Self {
    Self {
      cell,
      invalidated: false,
    }
  }
}

/// The result of looking a key up in a shard.
pub(crate) enum Lookup<K, V> {
  Hit(Arc<V>),
  /// The entry was present but had expired. It has been removed.
  Expired(RemovalNotification<K, V>),
  Absent,
}

/// One independently locked partition of the cache.
///
/// Completed entries and in-flight loads live side by side under the same
/// lock. A key only has both while its live entry is being refreshed; a
/// lookup then keeps returning the entry.
pub(crate) struct Shard<K, V, H> {
  entries: HashMap<K, CacheEntry<V>, H>,
  order: AccessOrder<K>,
  pub(crate) pending: HashMap<K, InFlight<V>, H>,
}

impl<K, V, H> Shard<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn new(hasher: H) -> Self {
    Self {
      entries: HashMap::with_hasher(hasher.clone()),
      order: AccessOrder::new(),
      pending: HashMap::with_hasher(hasher),
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  /// Looks a key up, touching it on a hit and removing it if expired.
  pub(crate) fn lookup<Q>(&mut self, key: &Q, now: u64, policy: &Policy) -> Lookup<K, V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.entries.get(key) {
      None => return Lookup::Absent,
      Some(entry) if !policy.is_expired(entry.written_at(), now) => {
        self.order.touch(entry.node());
        return Lookup::Hit(entry.value());
      }
      Some(_) => {}
    }

    match self.remove(key, policy) {
      Some((key, value)) => {
        Lookup::Expired(RemovalNotification::new(key, value, RemovalCause::Expired))
      }
      None => Lookup::Absent,
    }
  }

  /// Returns `true` if a live entry exists. Does not touch recency.
  pub(crate) fn contains<Q>(&self, key: &Q, now: u64, policy: &Policy) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self
      .entries
      .get(key)
      .is_some_and(|entry| !policy.is_expired(entry.written_at(), now))
  }

  /// Inserts or overwrites an entry, making it the most recently used.
  ///
  /// Returns the entry's node and, when an existing value was overwritten, a
  /// notification for it (`Expired` if the old value had already expired,
  /// `Replaced` otherwise).
  pub(crate) fn insert(
    &mut self,
    key: K,
    value: Arc<V>,
    now: u64,
    policy: &Policy,
  ) -> (Index, Option<RemovalNotification<K, V>>) {
    match self.entries.get_mut(&key) {
      Some(entry) => {
        let cause = if policy.is_expired(entry.written_at(), now) {
          RemovalCause::Expired
        } else {
          RemovalCause::Replaced
        };
        let old_value = entry.replace(value, now);
        let node = entry.node();
        self.order.touch(node);
        (node, Some(RemovalNotification::new(key, old_value, cause)))
      }
      None => {
        let node = self.order.push_back(key.clone());
        self.entries.insert(key, CacheEntry::new(value, now, node));
        (node, None)
      }
    }
  }

  /// Removes an entry and uncounts it while the shard is still locked.
  pub(crate) fn remove<Q>(&mut self, key: &Q, policy: &Policy) -> Option<(K, Arc<V>)>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let (key, entry) = self.entries.remove_entry(key)?;
    self.order.remove(entry.node());
    policy.record_removals(1);
    Some((key, entry.into_value()))
  }

  /// Removes the least recently used entry, skipping `protect` (the entry
  /// that is being admitted).
  pub(crate) fn evict_lru(&mut self, protect: Option<Index>) -> Option<(K, Arc<V>)> {
    let mut victim = self.order.front()?;
    if Some(victim) == protect {
      victim = self.order.next(victim)?;
    }
    let key = self.order.remove(victim)?;
    let entry = self.entries.remove(&key)?;
    Some((key, entry.into_value()))
  }

  /// Removes every expired entry.
  pub(crate) fn drain_expired(&mut self, now: u64, policy: &Policy) -> Vec<(K, Arc<V>)> {
    let expired: Vec<K> = self
      .entries
      .iter()
      .filter(|(_, entry)| policy.is_expired(entry.written_at(), now))
      .map(|(key, _)| key.clone())
      .collect();

    expired
      .into_iter()
      .filter_map(|key| self.remove(&key, policy))
      .collect()
  }

  /// Removes every entry and flags every in-flight load as invalidated.
  pub(crate) fn drain(&mut self, policy: &Policy) -> Vec<(K, Arc<V>)> {
    for in_flight in self.pending.values_mut() {
      in_flight.invalidated = true;
    }
    policy.record_removals(self.entries.len() as u64);
    self.order.clear();
    self
      .entries
      .drain()
      .map(|(key, entry)| (key, entry.into_value()))
      .collect()
  }

  // Keys from least to most recently used, for tests.
  #[cfg(test)]
  pub(crate) fn keys_by_recency(&self) -> Vec<K> {
    self.order.keys()
  }
}

/// A cache store that is partitioned into multiple, independently locked shards.
///
/// This design allows for high concurrency by ensuring that operations on
/// different keys are unlikely to contend for the same lock.
pub(crate) struct ShardedStore<K, V, H> {
  shards: Box<[CachePadded<Mutex<Shard<K, V, H>>>]>,
  hasher: H,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore`. `num_shards` must be a power of two.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let shards: Vec<_> = (0..num_shards)
      .map(|_| CachePadded::new(Mutex::new(Shard::new(hasher.clone()))))
      .collect();

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  pub(crate) fn num_shards(&self) -> usize {
    self.shards.len()
  }

  #[inline]
  pub(crate) fn shard_index<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
    hash_key(&self.hasher, key) as usize & (self.shards.len() - 1)
  }

  #[inline]
  pub(crate) fn lock_index(&self, index: usize) -> MutexGuard<'_, Shard<K, V, H>> {
    self.shards[index].lock()
  }

  /// Locks the shard that owns `key`.
  #[inline]
  pub(crate) fn lock<Q: Hash + ?Sized>(&self, key: &Q) -> MutexGuard<'_, Shard<K, V, H>> {
    self.lock_index(self.shard_index(key))
  }

  /// Returns an iterator over all the shard locks.
  pub(crate) fn iter_shards(&self) -> impl Iterator<Item = &Mutex<Shard<K, V, H>>> {
    self.shards.iter().map(|padded| &**padded)
  }
}
