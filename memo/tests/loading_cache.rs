mod common;

use common::{causes, RecordingListener};
use fibre_memo::{BoxError, CacheBuilder, LoadError, RemovalCause};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_get_uses_the_default_loader() {
  let loads = Arc::new(AtomicUsize::new(0));
  let counter = loads.clone();
  let cache = CacheBuilder::<u32, String>::new()
    .build_with_loader(move |key: &u32| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, BoxError>(format!("node-{key}"))
    })
    .unwrap();

  assert_eq!(*cache.get(4).unwrap(), "node-4");
  assert_eq!(*cache.get(4).unwrap(), "node-4");
  assert_eq!(loads.load(Ordering::SeqCst), 1);

  // Cache methods are reachable through Deref.
  assert!(cache.contains_key(&4));
  cache.put(5, "manual".to_string());
  assert_eq!(*cache.get(5).unwrap(), "manual");
  assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_get_all_loads_only_missing_keys() {
  let loads = Arc::new(AtomicUsize::new(0));
  let counter = loads.clone();
  let cache = CacheBuilder::<u32, u32>::new()
    .record_stats()
    .build_with_loader(move |key: &u32| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, BoxError>(key * 2)
    })
    .unwrap();

  cache.put(1, 100);
  let values = cache.get_all([1, 2, 3]).unwrap();
  assert_eq!(values.len(), 3);
  assert_eq!(*values[&1], 100);
  assert_eq!(*values[&3], 6);
  assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_get_all_stops_at_the_first_failure() {
  let cache = CacheBuilder::<u32, u32>::new()
    .build_with_loader(|key: &u32| {
      if *key == 2 {
        Err::<u32, BoxError>("missing".into())
      } else {
        Ok(*key)
      }
    })
    .unwrap();

  let err = cache.get_all([1, 2, 3]).unwrap_err();
  assert!(matches!(err, LoadError::Failed(_)));
  assert!(cache.contains_key(&1));
  assert!(!cache.contains_key(&3));
}

#[test]
fn test_refresh_failure_keeps_the_old_value() {
  let fail = Arc::new(AtomicBool::new(false));
  let switch = fail.clone();
  let cache = CacheBuilder::<u32, u32>::new()
    .record_stats()
    .build_with_loader(move |key: &u32| {
      if switch.load(Ordering::SeqCst) {
        Err::<u32, BoxError>("backend down".into())
      } else {
        Ok(*key + 1)
      }
    })
    .unwrap();

  assert_eq!(*cache.get(1).unwrap(), 2);
  fail.store(true, Ordering::SeqCst);
  assert!(cache.refresh(1).is_err());
  assert_eq!(cache.get_if_present(&1).as_deref(), Some(&2));

  let stats = cache.stats();
  assert_eq!(stats.load_success_count, 1);
  assert_eq!(stats.load_exception_count, 1);
}

#[test]
fn test_refresh_of_absent_key_loads_it() {
  let (listener, events) = RecordingListener::new();
  let cache = CacheBuilder::<u32, u32>::new()
    .removal_listener(listener)
    .build_with_loader(|key: &u32| Ok::<_, BoxError>(*key))
    .unwrap();

  assert_eq!(*cache.refresh(8).unwrap(), 8);
  assert!(cache.contains_key(&8));
  assert!(events.lock().is_empty());

  cache.refresh(8).unwrap();
  assert_eq!(causes(&events), vec![RemovalCause::Replaced]);
}

#[test]
fn test_readers_see_the_old_value_during_refresh() {
  let slow = Arc::new(AtomicBool::new(false));
  let barrier = Arc::new(Barrier::new(2));
  let generation = Arc::new(AtomicUsize::new(0));

  let cache = {
    let slow = slow.clone();
    let barrier = barrier.clone();
    let generation = generation.clone();
    CacheBuilder::<u32, usize>::new()
      .build_with_loader(move |_key: &u32| {
        if slow.load(Ordering::SeqCst) {
          barrier.wait();
          thread::sleep(Duration::from_millis(100));
        }
        Ok::<_, BoxError>(generation.fetch_add(1, Ordering::SeqCst))
      })
      .unwrap()
  };

  assert_eq!(*cache.get(1).unwrap(), 0);
  slow.store(true, Ordering::SeqCst);

  let refresher = {
    let cache = cache.clone();
    thread::spawn(move || cache.refresh(1))
  };
  barrier.wait();
  // The refresh is running; readers still get the old value.
  assert_eq!(*cache.get(1).unwrap(), 0);

  assert_eq!(*refresher.join().unwrap().unwrap(), 1);
  assert_eq!(*cache.get(1).unwrap(), 1);
}

#[test]
fn test_concurrent_refreshes_share_one_reload() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let loads = Arc::new(AtomicUsize::new(0));

  let cache = {
    let running = running.clone();
    let peak = peak.clone();
    let loads = loads.clone();
    CacheBuilder::<u32, usize>::new()
      .record_stats()
      .build_with_loader(move |_key: &u32| {
        let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now_running, Ordering::SeqCst);
        let generation = loads.fetch_add(1, Ordering::SeqCst);
        if generation > 0 {
          thread::sleep(Duration::from_millis(200));
        }
        running.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, BoxError>(generation)
      })
      .unwrap()
  };
  assert_eq!(*cache.get(1).unwrap(), 0);

  let barrier = Arc::new(Barrier::new(2));
  let refreshers: Vec<_> = (0..2)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.refresh(1).unwrap()
      })
    })
    .collect();
  let results: Vec<_> = refreshers.into_iter().map(|t| t.join().unwrap()).collect();

  assert_eq!(peak.load(Ordering::SeqCst), 1, "Reloads of one key never overlap");
  assert_eq!(loads.load(Ordering::SeqCst), 2);
  assert!(Arc::ptr_eq(&results[0], &results[1]));
  assert_eq!(*cache.get(1).unwrap(), 1);
  assert_eq!(cache.stats().load_count(), 2);
}

#[test]
fn test_miss_during_refresh_joins_the_reload() {
  let barrier = Arc::new(Barrier::new(2));
  let loads = Arc::new(AtomicUsize::new(0));

  let cache = {
    let barrier = barrier.clone();
    let loads = loads.clone();
    CacheBuilder::<u32, usize>::new()
      .build_with_loader(move |_key: &u32| {
        let generation = loads.fetch_add(1, Ordering::SeqCst);
        if generation > 0 {
          barrier.wait();
          thread::sleep(Duration::from_millis(150));
        }
        Ok::<_, BoxError>(generation)
      })
      .unwrap()
  };
  assert_eq!(*cache.get(1).unwrap(), 0);

  let refresher = {
    let cache = cache.clone();
    thread::spawn(move || cache.refresh(1).unwrap())
  };
  barrier.wait();

  // The old entry is gone, so this lookup misses and waits for the reload.
  assert!(cache.invalidate(&1));
  let joined = cache.get(1).unwrap();
  let refreshed = refresher.join().unwrap();

  assert!(Arc::ptr_eq(&joined, &refreshed));
  assert_eq!(loads.load(Ordering::SeqCst), 2);
}
