mod common;

use common::{causes, ManualTicker, RecordingListener};
use fibre_memo::{CacheBuilder, RemovalCause};
use std::convert::Infallible;
use std::thread;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(60);

#[test]
fn test_expired_entry_is_a_miss_and_reloads() {
  let ticker = ManualTicker::new();
  let (listener, events) = RecordingListener::new();
  let cache = CacheBuilder::<&'static str, u32>::new()
    .expire_after_write(TTL)
    .record_stats()
    .ticker(ticker.clone())
    .removal_listener(listener)
    .build()
    .unwrap();

  let first = cache.get_with("graph", || Ok::<_, Infallible>(1)).unwrap();
  assert_eq!(*first, 1);

  ticker.advance(TTL - Duration::from_nanos(1));
  assert_eq!(cache.get_if_present("graph").as_deref(), Some(&1), "Still live just before the deadline");

  ticker.advance(Duration::from_nanos(1));
  let second = cache.get_with("graph", || Ok::<_, Infallible>(2)).unwrap();
  assert_eq!(*second, 2, "An expired entry must be reloaded");

  let stats = cache.stats();
  assert_eq!(stats.eviction_count, 1);
  assert_eq!(stats.load_success_count, 2);
  assert_eq!(stats.miss_count, 2);
  assert_eq!(stats.hit_count, 1);
  assert_eq!(*events.lock(), vec![("graph", 1, RemovalCause::Expired)]);
}

#[test]
fn test_expired_lookup_removes_the_entry() {
  let ticker = ManualTicker::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put(1, 10);
  ticker.advance(TTL);
  assert!(!cache.contains_key(&1));
  // Not yet removed: only lookups and clean-up remove expired entries.
  assert_eq!(cache.size(), 1);
  assert!(cache.get_if_present(&1).is_none());
  assert_eq!(cache.size(), 0);
}

#[test]
fn test_put_restamps_the_write_time() {
  let ticker = ManualTicker::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put(1, 10);
  ticker.advance(TTL / 2);
  cache.put(1, 11);
  ticker.advance(TTL / 2);
  assert_eq!(cache.get_if_present(&1).as_deref(), Some(&11));
}

#[test]
fn test_reads_do_not_extend_life() {
  let ticker = ManualTicker::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put(1, 10);
  for _ in 0..3 {
    ticker.advance(TTL / 4);
    assert!(cache.get_if_present(&1).is_some());
  }
  ticker.advance(TTL / 4);
  assert!(cache.get_if_present(&1).is_none());
}

#[test]
fn test_overwriting_an_expired_entry_reports_expiry() {
  let ticker = ManualTicker::new();
  let (listener, events) = RecordingListener::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .record_stats()
    .ticker(ticker.clone())
    .removal_listener(listener)
    .build()
    .unwrap();

  cache.put(1, 10);
  cache.put(1, 11);
  ticker.advance(TTL);
  cache.put(1, 12);

  assert_eq!(causes(&events), vec![RemovalCause::Replaced, RemovalCause::Expired]);
  assert_eq!(cache.stats().eviction_count, 1);
  assert_eq!(cache.size(), 1);
}

#[test]
fn test_clean_up_sweeps_expired_entries() {
  let ticker = ManualTicker::new();
  let (listener, events) = RecordingListener::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .record_stats()
    .ticker(ticker.clone())
    .removal_listener(listener)
    .build()
    .unwrap();

  for key in 0..5 {
    cache.put(key, key);
  }
  ticker.advance(TTL / 2);
  cache.put(10, 10);
  ticker.advance(TTL / 2);

  assert_eq!(cache.clean_up(), 5);
  assert_eq!(cache.size(), 1);
  assert!(cache.contains_key(&10));
  assert_eq!(cache.stats().eviction_count, 5);
  assert!(causes(&events).iter().all(|cause| *cause == RemovalCause::Expired));
  assert_eq!(cache.clean_up(), 0);
}

#[test]
fn test_janitor_sweeps_in_the_background() {
  let ticker = ManualTicker::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .cleanup_interval(Duration::from_millis(10))
    .record_stats()
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put(1, 1);
  cache.put(2, 2);
  ticker.advance(TTL);

  let deadline = Instant::now() + Duration::from_secs(5);
  while cache.size() > 0 && Instant::now() < deadline {
    thread::sleep(Duration::from_millis(10));
  }
  assert_eq!(cache.size(), 0, "The janitor should have swept both entries");
  assert_eq!(cache.stats().eviction_count, 2);
}

#[test]
fn test_dropping_the_cache_stops_the_janitor() {
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(TTL)
    .cleanup_interval(Duration::from_millis(5))
    .build()
    .unwrap();
  cache.put(1, 1);
  drop(cache);
  // Nothing to assert beyond not hanging or panicking.
  thread::sleep(Duration::from_millis(20));
}
