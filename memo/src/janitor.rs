use crate::shared::CacheShared;

use std::hash::{BuildHasher, Hash};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, Thread};
use std::time::Duration;

use tracing::debug;

/// The background thread that periodically sweeps expired entries.
///
/// It only holds a weak reference to the cache, so it never keeps a cache
/// alive. The thread exits on its own once the cache is dropped.
pub(crate) struct Janitor {
  thread: Thread,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<K, V, H>(
    shared: Weak<CacheShared<K, V, H>>,
    interval: Duration,
  ) -> io::Result<Self>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::Builder::new()
      .name("fibre-memo-janitor".to_string())
      .spawn(move || {
        debug!(?interval, "cache janitor started");
        loop {
          thread::park_timeout(interval);
          if stop_clone.load(Ordering::Acquire) {
            break;
          }
          let Some(shared) = shared.upgrade() else {
            break;
          };
          let swept = shared.clean_up();
          if swept > 0 {
            debug!(swept, "janitor swept expired entries");
          }
        }
        debug!("cache janitor stopped");
      })?;

    Ok(Self {
      thread: handle.thread().clone(),
      stop_flag,
    })
  }

  /// Signals the thread to exit. Does not wait for it.
  pub(crate) fn stop(&self) {
    self.stop_flag.store(true, Ordering::Release);
    self.thread.unpark();
  }
}
