use crate::error::BoxError;

use std::fmt;
use std::sync::Arc;

/// Describes why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
  /// The entry was removed by `invalidate`, `invalidate_many` or
  /// `invalidate_all`, or its load finished after it was invalidated.
  Explicit,
  /// The entry's value was overwritten by `put`, a refresh, or a `put` that
  /// superseded an in-flight load.
  Replaced,
  /// The entry outlived `expire_after_write`.
  Expired,
  /// The entry was removed to keep the cache within `maximum_size`.
  Size,
}

impl RemovalCause {
  /// Returns `true` if the removal was automatic (size or expiry), as opposed
  /// to caused by the user. Only these removals count as evictions.
  pub fn was_evicted(self) -> bool {
    matches!(self, RemovalCause::Expired | RemovalCause::Size)
  }
}

impl fmt::Display for RemovalCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemovalCause::Explicit => write!(f, "explicitly invalidated"),
      RemovalCause::Replaced => write!(f, "replaced"),
      RemovalCause::Expired => write!(f, "expired after write"),
      RemovalCause::Size => write!(f, "evicted due to size"),
    }
  }
}

/// A notification of a single entry leaving the cache.
#[derive(Debug, Clone)]
pub struct RemovalNotification<K, V> {
  key: K,
  value: Arc<V>,
  cause: RemovalCause,
}

impl<K, V> RemovalNotification<K, V> {
  pub(crate) fn new(key: K, value: Arc<V>, cause: RemovalCause) -> Self {
    Self { key, value, cause }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  /// The removed value. This is the same allocation the cache handed out to
  /// readers.
  pub fn value(&self) -> &Arc<V> {
    &self.value
  }

  pub fn cause(&self) -> RemovalCause {
    self.cause
  }

  pub fn was_evicted(&self) -> bool {
    self.cause.was_evicted()
  }

  pub fn into_parts(self) -> (K, Arc<V>, RemovalCause) {
    (self.key, self.value, self.cause)
  }
}

/// A listener that can be registered with the cache to be told about every
/// entry that leaves it, whatever the cause.
///
/// `on_removal` is called synchronously on the thread that removed the entry,
/// after the cache has released its locks and before the removing operation
/// returns. Returning an error (or panicking) does not affect the cache; the
/// failure is logged and dropped. Listeners must not call back into the cache
/// that notified them.
pub trait RemovalListener<K, V>: Send + Sync {
  fn on_removal(&self, notification: RemovalNotification<K, V>) -> Result<(), BoxError>;
}

impl<K, V, F> RemovalListener<K, V> for F
where
  F: Fn(RemovalNotification<K, V>) -> Result<(), BoxError> + Send + Sync,
{
  fn on_removal(&self, notification: RemovalNotification<K, V>) -> Result<(), BoxError> {
    self(notification)
  }
}
