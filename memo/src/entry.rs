use std::sync::Arc;

use generational_arena::Index;

/// A container for a value in the cache, holding all necessary metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc so every reader shares one allocation.
  value: Arc<V>,
  /// Ticker reading (nanoseconds) at the time the value was written.
  written_at: u64,
  /// This entry's node in its shard's access order.
  node: Index,
}

impl<V> CacheEntry<V> {
  pub(crate) fn new(value: Arc<V>, written_at: u64, node: Index) -> Self {
    Self {
      value,
      written_at,
      node,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    Arc::clone(&self.value)
  }

  #[inline]
  pub(crate) fn written_at(&self) -> u64 {
    self.written_at
  }

  #[inline]
  pub(crate) fn node(&self) -> Index {
    self.node
  }

  /// Overwrites the value in place, restamping the write time. Returns the
  /// previous value.
  pub(crate) fn replace(&mut self, value: Arc<V>, written_at: u64) -> Arc<V> {
    self.written_at = written_at;
    std::mem::replace(&mut self.value, value)
  }

  pub(crate) fn into_value(self) -> Arc<V> {
    self.value
  }
}
