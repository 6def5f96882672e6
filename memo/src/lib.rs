//! A bounded, statistics-tracked, lazily populated concurrent cache.
//!
//! Values are computed on first access and then served from memory:
//! "if cached, return it; otherwise create it, cache it and return it".
//!
//! # Features
//! - **Single-flight loading**: concurrent requests for the same missing key
//!   run the loader once and all receive the same `Arc<V>`.
//! - **Sync & Async**: blocking `Cache`/`LoadingCache` handles and an
//!   `AsyncCache` whose loads run as their own tasks.
//! - **Size bound**: least-recently-used eviction once `maximum_size` is
//!   exceeded.
//! - **Expiry**: entries expire a fixed time after they were written.
//! - **Statistics**: hits, misses, loads, load failures, load time and
//!   evictions, with derived rates.
//! - **Removal notifications**: a listener is told about every entry that
//!   leaves the cache and why.
//!
//! ```
//! use fibre_memo::CacheBuilder;
//! use std::convert::Infallible;
//!
//! let cache = CacheBuilder::<u32, String>::new()
//!   .maximum_size(1)
//!   .record_stats()
//!   .build()
//!   .unwrap();
//!
//! cache.put(1, "one".to_string());
//! let two = cache.get_with(2, || Ok::<_, Infallible>("two".to_string())).unwrap();
//! assert_eq!(*two, "two");
//! assert!(cache.get_if_present(&1).is_none());
//!
//! let stats = cache.stats();
//! assert_eq!(stats.eviction_count, 1);
//! assert_eq!(stats.request_count(), 2);
//! ```

// Public modules that form the API
pub mod builder;
pub mod config;
pub mod error;
pub mod handles;
pub mod listener;
pub mod runtime;
pub mod stats;
pub mod time;

// Internal, crate-only modules
mod entry;
mod janitor;
mod loader;
mod notifier;
mod policy;
mod shared;
mod store;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use config::CacheConfig;
pub use error::{BoxError, BuildError, ConfigError, LoadError, NotifierError};
pub use handles::{AsyncCache, Cache, LoadingCache};
pub use listener::{RemovalCause, RemovalListener, RemovalNotification};
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use stats::CacheStats;
pub use time::{SystemTicker, Ticker};
