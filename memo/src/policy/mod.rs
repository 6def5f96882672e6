//! The admission and eviction rules shared by every shard.

pub(crate) mod access_order;

use crate::time::duration_to_nanos;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

/// Size bound and expiry rule for one cache.
///
/// The entry count is global and atomic. A thread that pushes the count over
/// `maximum_size` must first claim an eviction (which decrements the count)
/// and then remove exactly one victim, so concurrent inserters never evict
/// more entries than the bound requires.
#[derive(Debug)]
pub(crate) struct Policy {
  maximum_size: Option<u64>,
  expire_after_write: Option<u64>,
  entry_count: CachePadded<AtomicU64>,
}

impl Policy {
  pub(crate) fn new(maximum_size: Option<u64>, expire_after_write: Option<Duration>) -> Self {
    Self {
      maximum_size,
      expire_after_write: expire_after_write.map(duration_to_nanos),
      entry_count: CachePadded::new(AtomicU64::new(0)),
    }
  }

  pub(crate) fn expires(&self) -> bool {
    self.expire_after_write.is_some()
  }

  /// An entry is expired once its age reaches `expire_after_write`.
  #[inline]
  pub(crate) fn is_expired(&self, written_at: u64, now: u64) -> bool {
    self
      .expire_after_write
      .is_some_and(|ttl| now.saturating_sub(written_at) >= ttl)
  }

  pub(crate) fn entry_count(&self) -> u64 {
    self.entry_count.load(Ordering::Acquire)
  }

  /// Counts a newly admitted key.
  #[inline]
  pub(crate) fn record_admission(&self) {
    self.entry_count.fetch_add(1, Ordering::AcqRel);
  }

  /// Uncounts keys removed by invalidation or expiry. Called with the
  /// owning shard still locked, so the count never runs ahead of the store.
  #[inline]
  pub(crate) fn record_removals(&self, removed: u64) {
    if removed > 0 {
      self.entry_count.fetch_sub(removed, Ordering::AcqRel);
    }
  }

  pub(crate) fn is_over_capacity(&self) -> bool {
    self
      .maximum_size
      .is_some_and(|max| self.entry_count() > max)
  }

  /// Claims the right to evict one entry if the cache is over capacity.
  ///
  /// A successful claim already uncounts the victim; the caller must either
  /// remove one entry or hand the claim back with `release_claim`.
  pub(crate) fn claim_eviction(&self) -> bool {
    let Some(max) = self.maximum_size else {
      return false;
    };
    self
      .entry_count
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
        (count > max).then(|| count - 1)
      })
      .is_ok()
  }

  /// Returns a claim that found no victim.
  pub(crate) fn release_claim(&self) {
    self.entry_count.fetch_add(1, Ordering::AcqRel);
  }
}
