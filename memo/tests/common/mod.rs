#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fibre_memo::{BoxError, Cache, CacheBuilder, RemovalCause, RemovalListener, RemovalNotification, Ticker};
use parking_lot::Mutex;

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash.
// For a 4-shard cache:
// - key 0 -> shard 0
// - key 1 -> shard 1
// - key 5 -> shard 1 (5 & 3 = 1)
#[derive(Clone, Default)]
pub struct ShardControllingHasher;
impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, _: &[u8]) {
    unimplemented!()
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTicker {
  nanos: AtomicU64,
}

impl ManualTicker {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn advance(&self, duration: Duration) {
    self
      .nanos
      .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
  }
}

impl Ticker for ManualTicker {
  fn read(&self) -> u64 {
    self.nanos.load(Ordering::SeqCst)
  }
}

/// Records every notification it receives, in order.
pub struct RecordingListener<K, V> {
  events: Arc<Mutex<Vec<(K, V, RemovalCause)>>>,
}

impl<K, V> RecordingListener<K, V> {
  pub fn new() -> (Self, Arc<Mutex<Vec<(K, V, RemovalCause)>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    (
      Self {
        events: events.clone(),
      },
      events,
    )
  }
}

impl<K, V> RemovalListener<K, V> for RecordingListener<K, V>
where
  K: Clone + Send + Sync,
  V: Clone + Send + Sync,
{
  fn on_removal(&self, notification: RemovalNotification<K, V>) -> Result<(), BoxError> {
    let (key, value, cause) = notification.into_parts();
    self.events.lock().push((key, (*value).clone(), cause));
    Ok(())
  }
}

pub fn causes<K, V>(events: &Mutex<Vec<(K, V, RemovalCause)>>) -> Vec<RemovalCause> {
  events.lock().iter().map(|(_, _, cause)| *cause).collect()
}

pub fn build_test_cache(shards: usize, maximum_size: u64) -> Cache<i32, String, ShardControllingHasher> {
  CacheBuilder::new()
    .shards(shards)
    .maximum_size(maximum_size)
    .record_stats()
    .hasher(ShardControllingHasher)
    .build()
    .unwrap()
}
