//! Two-tier cache: a bounded in-process tier in front of a shared tier.

use color_eyre::{eyre::eyre, Result};
use moka::sync::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::storage::SqliteStorage;
use super::traits::{CacheStore, Cacheable};
use crate::config::CacheConfig;

/// A serialized value held by the local tier.
#[derive(Clone)]
struct LocalEntry {
  data: Arc<[u8]>,
  ttl: Duration,
}

/// Expires local entries after their own TTL, capped at the local tier's TTL.
struct LocalExpiry {
  max_ttl: Duration,
}

impl LocalExpiry {
  fn ttl_for(&self, entry: &LocalEntry) -> Option<Duration> {
    Some(entry.ttl.min(self.max_ttl))
  }
}

impl Expiry<String, LocalEntry> for LocalExpiry {
  fn expire_after_create(
    &self,
    _key: &String,
    value: &LocalEntry,
    _created_at: Instant,
  ) -> Option<Duration> {
    self.ttl_for(value)
  }

  fn expire_after_update(
    &self,
    _key: &String,
    value: &LocalEntry,
    _updated_at: Instant,
    _duration_until_expiry: Option<Duration>,
  ) -> Option<Duration> {
    self.ttl_for(value)
  }
}

/// Cache store that layers a small, frequency-bounded local cache (moka's
/// TinyLFU) over a shared backend.
///
/// Reads try the local tier first and backfill it from the shared tier.
/// Writes go to the shared tier first so a failed write never leaves a value
/// visible only to this process.
pub struct TieredStore<S: CacheStore = SqliteStorage> {
  local: Cache<String, LocalEntry>,
  local_ttl: Duration,
  shared: S,
}

impl TieredStore<SqliteStorage> {
  /// Open the SQLite-backed tiered store described by `config`.
  pub fn open(config: &CacheConfig) -> Result<Self> {
    let path = match &config.path {
      Some(path) => path.clone(),
      None => SqliteStorage::default_path()?,
    };
    tracing::debug!(path = %path.display(), "Opening shared cache tier");

    let shared = SqliteStorage::open(&path)?;
    Ok(Self::new(shared, config.local_capacity, config.local_ttl()))
  }
}

impl<S: CacheStore> TieredStore<S> {
  /// Layer a local tier of at most `capacity` entries, each living at most
  /// `local_ttl`, over `shared`.
  pub fn new(shared: S, capacity: u64, local_ttl: Duration) -> Self {
    let local = Cache::builder()
      .max_capacity(capacity)
      .expire_after(LocalExpiry { max_ttl: local_ttl })
      .build();

    Self {
      local,
      local_ttl,
      shared,
    }
  }

  fn local_key<T: Cacheable>(key: &str) -> String {
    format!("{}:{}", T::entity_type(), key)
  }

  fn decode<T: Cacheable>(key: &str, entry: &LocalEntry) -> Result<T> {
    serde_json::from_slice(&entry.data)
      .map_err(|e| eyre!("Failed to deserialize locally cached {}: {}", key, e))
  }
}

impl<S: CacheStore> CacheStore for TieredStore<S> {
  fn exists<T: Cacheable>(&self, key: &str) -> Result<bool> {
    if self.local.contains_key(&Self::local_key::<T>(key)) {
      return Ok(true);
    }
    self.shared.exists::<T>(key)
  }

  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    let local_key = Self::local_key::<T>(key);

    if let Some(entry) = self.local.get(&local_key) {
      return Self::decode(key, &entry).map(Some);
    }

    let Some(value) = self.shared.get::<T>(key)? else {
      return Ok(None);
    };

    // Backfill the local tier. The shared row's remaining lifetime is not
    // known here, so the local tier's own TTL bounds the copy.
    match serde_json::to_vec(&value) {
      Ok(data) => self.local.insert(
        local_key,
        LocalEntry {
          data: data.into(),
          ttl: self.local_ttl,
        },
      ),
      Err(e) => tracing::debug!("Skipping local backfill for {}: {}", key, e),
    }

    Ok(Some(value))
  }

  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    self.shared.set(key, value, ttl)?;

    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
    self.local.insert(
      Self::local_key::<T>(key),
      LocalEntry {
        data: data.into(),
        ttl,
      },
    );

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::NoopStorage;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Reading {
    celsius: i32,
  }

  impl Cacheable for Reading {
    fn entity_type() -> &'static str {
      "reading"
    }
  }

  const MINUTE: Duration = Duration::from_secs(60);

  fn sqlite_tiered() -> TieredStore<SqliteStorage> {
    TieredStore::new(SqliteStorage::open_in_memory().unwrap(), 100, MINUTE)
  }

  #[test]
  fn test_set_is_visible_in_both_tiers() {
    let store = sqlite_tiered();
    store.set("oslo", &Reading { celsius: 3 }, MINUTE).unwrap();

    assert!(store.local.contains_key("reading:oslo"));
    assert!(store.shared.exists::<Reading>("oslo").unwrap());
    assert_eq!(store.get::<Reading>("oslo").unwrap(), Some(Reading { celsius: 3 }));
  }

  #[test]
  fn test_shared_hit_backfills_local() {
    let store = sqlite_tiered();
    store.shared.set("lima", &Reading { celsius: 19 }, MINUTE).unwrap();
    assert!(!store.local.contains_key("reading:lima"));

    assert!(store.exists::<Reading>("lima").unwrap());
    assert_eq!(store.get::<Reading>("lima").unwrap(), Some(Reading { celsius: 19 }));
    assert!(store.local.contains_key("reading:lima"));
  }

  #[test]
  fn test_local_tier_serves_without_shared() {
    // Nothing reaches the no-op shared tier, so hits must come from memory.
    let store = TieredStore::new(NoopStorage, 100, MINUTE);
    store.set("rome", &Reading { celsius: 21 }, MINUTE).unwrap();

    assert!(store.exists::<Reading>("rome").unwrap());
    assert_eq!(store.get::<Reading>("rome").unwrap(), Some(Reading { celsius: 21 }));
  }

  #[test]
  fn test_miss_in_both_tiers() {
    let store = sqlite_tiered();

    assert!(!store.exists::<Reading>("nowhere").unwrap());
    assert_eq!(store.get::<Reading>("nowhere").unwrap(), None);
  }

  #[test]
  fn test_local_tier_caps_entry_lifetime() {
    let store = TieredStore::new(NoopStorage, 100, Duration::from_millis(50));
    store.set("oslo", &Reading { celsius: 3 }, MINUTE).unwrap();
    assert!(store.exists::<Reading>("oslo").unwrap());

    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(store.get::<Reading>("oslo").unwrap(), None);
    assert!(!store.exists::<Reading>("oslo").unwrap());
  }

  #[test]
  fn test_local_tier_is_bounded_by_capacity() {
    let store = TieredStore::new(NoopStorage, 2, MINUTE);
    for celsius in 0..10 {
      store
        .set(&format!("city-{}", celsius), &Reading { celsius }, MINUTE)
        .unwrap();
    }

    store.local.run_pending_tasks();
    assert!(store.local.entry_count() <= 2);
  }

  #[test]
  fn test_zero_ttl_expires_everywhere() {
    let store = sqlite_tiered();
    store.set("oslo", &Reading { celsius: 3 }, Duration::ZERO).unwrap();

    assert!(!store.exists::<Reading>("oslo").unwrap());
    assert_eq!(store.get::<Reading>("oslo").unwrap(), None);
  }
}
