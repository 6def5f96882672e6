use crate::time::duration_to_nanos;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal statistics recorder for the cache.
/// All counters are atomic to allow for lock-free updates.
///
/// When statistics are disabled every `record_*` call is a no-op, so the
/// counters stay at zero.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
  enabled: bool,

  // --- Lookups ---
  hits: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,

  // --- Loads ---
  load_successes: CachePadded<AtomicU64>,
  load_exceptions: CachePadded<AtomicU64>,
  total_load_nanos: CachePadded<AtomicU64>,

  // --- Size and expiry evictions ---
  evictions: CachePadded<AtomicU64>,
}

impl StatsCounter {
  pub(crate) fn new(enabled: bool) -> Self {
    Self {
      enabled,
      ..Self::default()
    }
  }

  #[inline]
  pub(crate) fn record_hit(&self) {
    if self.enabled {
      self.hits.fetch_add(1, Ordering::Relaxed);
    }
  }

  #[inline]
  pub(crate) fn record_miss(&self) {
    if self.enabled {
      self.misses.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_load_success(&self, load_time: Duration) {
    if self.enabled {
      self.load_successes.fetch_add(1, Ordering::Relaxed);
      self
        .total_load_nanos
        .fetch_add(duration_to_nanos(load_time), Ordering::Relaxed);
    }
  }

  pub(crate) fn record_load_exception(&self, load_time: Duration) {
    if self.enabled {
      self.load_exceptions.fetch_add(1, Ordering::Relaxed);
      self
        .total_load_nanos
        .fetch_add(duration_to_nanos(load_time), Ordering::Relaxed);
    }
  }

  #[inline]
  pub(crate) fn record_eviction(&self) {
    if self.enabled {
      self.evictions.fetch_add(1, Ordering::Relaxed);
    }
  }

  /// Creates a point-in-time snapshot of the current counters.
  pub(crate) fn snapshot(&self) -> CacheStats {
    CacheStats {
      hit_count: self.hits.load(Ordering::Relaxed),
      miss_count: self.misses.load(Ordering::Relaxed),
      load_success_count: self.load_successes.load(Ordering::Relaxed),
      load_exception_count: self.load_exceptions.load(Ordering::Relaxed),
      total_load_time_nanos: self.total_load_nanos.load(Ordering::Relaxed),
      eviction_count: self.evictions.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time, immutable snapshot of a cache's statistics.
///
/// Counters only ever grow, so the difference between two snapshots (see
/// [`CacheStats::minus`]) describes the activity in between.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CacheStats {
  /// Lookups served from the cache without running a loader.
  pub hit_count: u64,
  /// Lookups that required a load, whether this caller ran the loader or
  /// joined another caller's in-flight load.
  pub miss_count: u64,
  /// Loads that produced a value.
  pub load_success_count: u64,
  /// Loads that failed with an error or a panic.
  pub load_exception_count: u64,
  /// Total time spent in loaders, successful or not, in nanoseconds.
  pub total_load_time_nanos: u64,
  /// Entries removed because of the size bound or expiry. Explicit
  /// invalidation and replacement are not evictions.
  pub eviction_count: u64,
}

impl CacheStats {
  /// The number of lookups, `hit_count + miss_count`.
  pub fn request_count(&self) -> u64 {
    self.hit_count.saturating_add(self.miss_count)
  }

  /// The number of loads that produced a value. Failed loads are counted
  /// in `load_exception_count` only, so for lookups that each start their
  /// own load `miss_count == load_count() + load_exception_count`.
  pub fn load_count(&self) -> u64 {
    self.load_success_count
  }

  fn load_attempts(&self) -> u64 {
    self
      .load_success_count
      .saturating_add(self.load_exception_count)
  }

  /// The ratio of hits to requests. `1.0` when there were no requests.
  pub fn hit_rate(&self) -> f64 {
    match self.request_count() {
      0 => 1.0,
      requests => self.hit_count as f64 / requests as f64,
    }
  }

  /// The ratio of misses to requests. `0.0` when there were no requests.
  pub fn miss_rate(&self) -> f64 {
    match self.request_count() {
      0 => 0.0,
      requests => self.miss_count as f64 / requests as f64,
    }
  }

  /// The ratio of failed loads to all loads. `0.0` when nothing was loaded.
  pub fn load_exception_rate(&self) -> f64 {
    match self.load_attempts() {
      0 => 0.0,
      loads => self.load_exception_count as f64 / loads as f64,
    }
  }

  /// Total time spent in loaders.
  pub fn total_load_time(&self) -> Duration {
    Duration::from_nanos(self.total_load_time_nanos)
  }

  /// The average time spent per load, successful or not.
  pub fn average_load_penalty(&self) -> Duration {
    match self.load_attempts() {
      0 => Duration::ZERO,
      loads => Duration::from_nanos(self.total_load_time_nanos / loads),
    }
  }

  /// Returns the difference `self - other`, floored at zero per counter.
  pub fn minus(&self, other: &CacheStats) -> CacheStats {
    CacheStats {
      hit_count: self.hit_count.saturating_sub(other.hit_count),
      miss_count: self.miss_count.saturating_sub(other.miss_count),
      load_success_count: self
        .load_success_count
        .saturating_sub(other.load_success_count),
      load_exception_count: self
        .load_exception_count
        .saturating_sub(other.load_exception_count),
      total_load_time_nanos: self
        .total_load_time_nanos
        .saturating_sub(other.total_load_time_nanos),
      eviction_count: self.eviction_count.saturating_sub(other.eviction_count),
    }
  }

  /// Returns the sum `self + other`, saturating per counter.
  pub fn plus(&self, other: &CacheStats) -> CacheStats {
    CacheStats {
      hit_count: self.hit_count.saturating_add(other.hit_count),
      miss_count: self.miss_count.saturating_add(other.miss_count),
      load_success_count: self
        .load_success_count
        .saturating_add(other.load_success_count),
      load_exception_count: self
        .load_exception_count
        .saturating_add(other.load_exception_count),
      total_load_time_nanos: self
        .total_load_time_nanos
        .saturating_add(other.total_load_time_nanos),
      eviction_count: self.eviction_count.saturating_add(other.eviction_count),
    }
  }
}

impl fmt::Debug for CacheStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStats")
      .field("request_count", &self.request_count())
      .field("hit_count", &self.hit_count)
      .field("miss_count", &self.miss_count)
      .field("hit_rate", &format!("{:.2}%", self.hit_rate() * 100.0))
      .field("load_success_count", &self.load_success_count)
      .field("load_exception_count", &self.load_exception_count)
      .field("total_load_time", &self.total_load_time())
      .field("eviction_count", &self.eviction_count)
      .finish()
  }
}
