mod common;

use common::ManualTicker;
use fibre_memo::{BuildError, CacheBuilder, CacheConfig, TokioSpawner};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_builder_from_option_string() {
  let config: CacheConfig = "maximum_size=2,record_stats".parse().unwrap();
  let cache = CacheBuilder::<i32, i32>::from_config(&config).build().unwrap();

  for key in 0..3 {
    cache.put(key, key);
  }
  assert_eq!(cache.size(), 2);
  assert_eq!(cache.stats().eviction_count, 1);
  assert!(cache.get_if_present(&2).is_some());
  assert_eq!(cache.stats().hit_count, 1);
}

#[test]
fn test_config_expiry_uses_the_ticker() {
  let ticker = ManualTicker::new();
  let config: CacheConfig = "expire_after_write=10m".parse().unwrap();
  let cache = CacheBuilder::<i32, i32>::from_config(&config)
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put(1, 1);
  ticker.advance(Duration::from_secs(9 * 60));
  assert!(cache.contains_key(&1));
  ticker.advance(Duration::from_secs(60));
  assert!(!cache.contains_key(&1));
}

#[test]
fn test_config_only_overrides_what_it_sets() {
  let config = CacheConfig {
    maximum_size: Some(1),
    ..CacheConfig::default()
  };
  let cache = CacheBuilder::<i32, i32>::new()
    .record_stats()
    .config(&config)
    .build()
    .unwrap();

  cache.put(1, 1);
  cache.put(2, 2);
  assert_eq!(cache.size(), 1);
  assert_eq!(cache.stats().eviction_count, 1, "record_stats survives the config");
}

#[test]
fn test_invalid_settings_are_rejected() {
  let zero_size = CacheBuilder::<i32, i32>::new().maximum_size(0).build();
  assert_eq!(zero_size.unwrap_err(), BuildError::ZeroMaximumSize);

  let zero_ttl = CacheBuilder::<i32, i32>::new()
    .expire_after_write(Duration::ZERO)
    .build();
  assert_eq!(zero_ttl.unwrap_err(), BuildError::ZeroExpiry);

  let zero_interval = CacheBuilder::<i32, i32>::new()
    .cleanup_interval(Duration::ZERO)
    .build();
  assert_eq!(zero_interval.unwrap_err(), BuildError::ZeroCleanupInterval);

  let zero_shards = CacheBuilder::<i32, i32>::new().shards(0).build();
  assert_eq!(zero_shards.unwrap_err(), BuildError::ZeroShards);

  let config: CacheConfig = "shards=18446744073709551615".parse().unwrap();
  let huge_shards = CacheBuilder::<i32, i32>::from_config(&config).build();
  assert!(matches!(huge_shards, Err(BuildError::TooManyShards { .. })));

  let config: CacheConfig = "shards=1099511627776".parse().unwrap();
  let huge_shards = CacheBuilder::<i32, i32>::from_config(&config).build();
  assert!(matches!(huge_shards, Err(BuildError::TooManyShards { .. })));

  let config: CacheConfig = "maximum_size=0".parse().unwrap();
  let from_config = CacheBuilder::<i32, i32>::from_config(&config).build();
  assert_eq!(from_config.unwrap_err(), BuildError::ZeroMaximumSize);
}

#[test]
fn test_async_cache_needs_a_runtime_or_spawner() {
  let result = CacheBuilder::<i32, i32>::new().build_async();
  assert_eq!(result.unwrap_err(), BuildError::SpawnerRequired);
}

#[test]
fn test_async_cache_with_explicit_spawner() {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(2)
    .enable_time()
    .build()
    .unwrap();

  // Built outside the runtime; loads go to the given spawner.
  let cache = CacheBuilder::<i32, String>::new()
    .record_stats()
    .spawner(Arc::new(TokioSpawner::new(runtime.handle().clone())))
    .build_async()
    .unwrap();

  let value = runtime
    .block_on(cache.get_with(1, || async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok::<_, Infallible>("one".to_string())
    }))
    .unwrap();
  assert_eq!(*value, "one");
  assert_eq!(cache.stats().load_success_count, 1);

  // The sync view shares the same entries.
  let sync = cache.to_sync();
  assert_eq!(sync.get_if_present(&1).as_deref().map(String::as_str), Some("one"));
}

#[test]
fn test_builder_debug_hides_callbacks() {
  let builder = CacheBuilder::<i32, i32>::new()
    .maximum_size(8)
    .removal_listener(|_n: fibre_memo::RemovalNotification<i32, i32>| -> Result<(), fibre_memo::BoxError> { Ok(()) });
  let debug = format!("{builder:?}");
  assert!(debug.contains("maximum_size: Some(8)"));
  assert!(debug.contains("has_listener: true"));
}
