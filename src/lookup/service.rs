use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::error::LookupError;
use super::orchestrator::CacheOrchestrator;
use crate::cache::CacheStore;
use crate::weather::{CityKey, ForecastResult, WeatherSource};

/// Entry point for the request boundary: weather for a city by name.
///
/// Cheap to clone; clones share the same orchestrator.
pub struct LookupService<W, S: CacheStore> {
  orchestrator: Arc<CacheOrchestrator<W, S>>,
}

impl<W, S: CacheStore> Clone for LookupService<W, S> {
  fn clone(&self) -> Self {
    Self {
      orchestrator: Arc::clone(&self.orchestrator),
    }
  }
}

impl<W: WeatherSource, S: CacheStore> LookupService<W, S> {
  pub fn new(orchestrator: CacheOrchestrator<W, S>) -> Self {
    Self {
      orchestrator: Arc::new(orchestrator),
    }
  }

  /// Weather for `city`, from the cache when possible, otherwise resolved
  /// upstream and cached.
  pub async fn lookup(
    &self,
    city: &str,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, LookupError> {
    let key = CityKey::parse(city).ok_or(LookupError::InvalidInput)?;

    let result = self
      .orchestrator
      .get_or_resolve(&key, cancel)
      .await
      .inspect_err(|e| {
        if let LookupError::Resolution(err) = e {
          tracing::debug!(city = %key, stage = ?err.stage(), "Resolution failed: {}", err);
        }
      })?;
    tracing::info!(city = %key, source = ?result.source, "Weather lookup");

    Ok(result.data)
  }

  /// Weather for `city` from the cache only. Never calls upstream; fails
  /// when the city is not cached.
  pub async fn lookup_cached_only(
    &self,
    city: &str,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, LookupError> {
    let key = CityKey::parse(city).ok_or(LookupError::InvalidInput)?;

    Ok(self.orchestrator.read_cached(&key, cancel).await?)
  }

  /// Wait for outstanding cache write-backs. Call before shutting down so
  /// detached writes are not lost.
  pub async fn flush(&self) {
    self.orchestrator.wait_for_write_backs().await;
  }
}
