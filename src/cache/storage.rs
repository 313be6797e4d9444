//! Shared cache tier backed by SQLite, plus a no-op backend.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{CacheStore, Cacheable};

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStore for NoopStorage {
  fn exists<T: Cacheable>(&self, _key: &str) -> Result<bool> {
    Ok(false) // Always miss
  }

  fn get<T: Cacheable>(&self, _key: &str) -> Result<Option<T>> {
    Ok(None) // Always miss
  }

  fn set<T: Cacheable>(&self, _key: &str, _value: &T, _ttl: Duration) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based cache storage.
///
/// The database file can be shared by several processes; each row carries
/// its own expiry and expired rows are invisible to reads.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    // Other processes may hold the database; wait for them instead of failing.
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;
    conn
      .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to enable WAL journal: {}", e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("skycache").join("cache.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    let purged = storage.purge_expired()?;
    if purged > 0 {
      tracing::debug!(purged, "Removed expired cache rows");
    }

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Delete every row whose expiry has passed. Returns the number removed.
  pub fn purge_expired(&self) -> Result<usize> {
    let now = Utc::now().timestamp_millis();

    self
      .lock()?
      .execute(
        "DELETE FROM entity_cache WHERE expires_at <= ?",
        params![now],
      )
      .map_err(|e| eyre!("Failed to purge expired cache rows: {}", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (entity_type, entity_key)
);

CREATE INDEX IF NOT EXISTS idx_entity_cache_expires
    ON entity_cache(expires_at);
"#;

impl CacheStore for SqliteStorage {
  fn exists<T: Cacheable>(&self, key: &str) -> Result<bool> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp_millis();

    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM entity_cache
         WHERE entity_type = ? AND entity_key = ? AND expires_at > ?",
        params![T::entity_type(), key, now],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to check cache key {}: {}", key, e))?;

    Ok(found.is_some())
  }

  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp_millis();

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM entity_cache
         WHERE entity_type = ? AND entity_key = ? AND expires_at > ?",
        params![T::entity_type(), key, now],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache key {}: {}", key, e))?;

    match data {
      Some(data) => {
        let value: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| eyre!("Invalid cache TTL: {}", e))?;
    let now = Utc::now();
    let expires_at = now
      .checked_add_signed(ttl)
      .ok_or_else(|| eyre!("Cache TTL overflows the clock"))?;

    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          T::entity_type(),
          key,
          data,
          now.timestamp_millis(),
          expires_at.timestamp_millis()
        ],
      )
      .map_err(|e| eyre!("Failed to store cache key {}: {}", key, e))?;

    Ok(())
  }
}
