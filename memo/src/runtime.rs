use std::{future::Future, pin::Pin};

/// A trait for spawning a future onto an asynchronous runtime.
///
/// `AsyncCache` spawns each load through its spawner, so a load keeps running
/// even if the caller that started it stops waiting.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// A `TaskSpawner` backed by a Tokio runtime handle.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  pub fn new(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }

  /// Returns a spawner for the Tokio runtime the caller is running in, or
  /// `None` outside of a runtime.
  pub fn current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.0.spawn(future);
  }
}

/// Returns a spawner for the Tokio runtime the caller is running in, if any.
/// Used for loads started through a handle that was built without one.
#[cfg(feature = "tokio")]
pub(crate) fn current_spawner() -> Option<Box<dyn TaskSpawner>> {
  TokioSpawner::current().map(|spawner| Box::new(spawner) as Box<dyn TaskSpawner>)
}

#[cfg(not(feature = "tokio"))]
pub(crate) fn current_spawner() -> Option<Box<dyn TaskSpawner>> {
  None
}
