//! Time sources for expiry and load timing.

use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for the system ticker.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A monotonic clock read in nanoseconds.
///
/// The cache reads its ticker to stamp entries on write, to decide whether an
/// entry has outlived `expire_after_write`, and to time loads. Tests can plug
/// in a manually advanced ticker through `CacheBuilder::ticker`.
pub trait Ticker: Send + Sync + 'static {
  /// Returns the number of nanoseconds elapsed since an arbitrary fixed point.
  fn read(&self) -> u64;
}

/// The default ticker, backed by `Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTicker;

impl Ticker for SystemTicker {
  #[inline]
  fn read(&self) -> u64 {
    duration_to_nanos(Instant::now().saturating_duration_since(*CACHE_EPOCH))
  }
}

/// Converts a `Duration` to nanoseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_to_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
