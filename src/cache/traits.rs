//! Core traits and types for the caching system.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Trait for values that can be cached.
///
/// Values are stored serialized, so implementors only need serde support and
/// a type name used to keep different kinds of values apart in storage.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Entity type name for storage organization (e.g., "forecast")
  fn entity_type() -> &'static str;
}

/// Trait for cache storage backends.
///
/// Calls may block on I/O. Async callers are expected to run them on a
/// blocking-capable thread rather than inline on the runtime.
pub trait CacheStore: Send + Sync + 'static {
  /// Whether a live (non-expired) value is stored under `key`.
  fn exists<T: Cacheable>(&self, key: &str) -> Result<bool>;

  /// Get the value stored under `key`, if any.
  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<T>>;

  /// Store `value` under `key`, replacing any previous value. It expires
  /// after `ttl`.
  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;
}

/// Result from a cache-aside lookup, including metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from freshly resolved data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where a lookup result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Resolved from the upstream source
  Network,
  /// Served from the cache
  Cache,
}
