//! Cache-aside orchestration around the resolution pipeline.

use color_eyre::eyre::eyre;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::error::{CacheError, LookupError};
use crate::cache::{CacheResult, CacheStore};
use crate::config::WriteBackMode;
use crate::weather::{CityKey, ForecastResult, ResolutionError, ResolutionPipeline, WeatherSource};

/// Decides between serving from the cache and resolving upstream, and owns
/// the write-back of freshly resolved forecasts.
///
/// Holds no per-city state: concurrent misses for the same city each resolve
/// and each write, and the last write wins.
pub struct CacheOrchestrator<W, S: CacheStore> {
  pipeline: ResolutionPipeline<W>,
  store: Arc<S>,
  ttl: Duration,
  write_back: WriteBackMode,
  /// Detached write-backs still in flight
  pending: TaskTracker,
}

impl<W: WeatherSource, S: CacheStore> CacheOrchestrator<W, S> {
  pub fn new(pipeline: ResolutionPipeline<W>, store: S, ttl: Duration) -> Self {
    Self {
      pipeline,
      store: Arc::new(store),
      ttl,
      write_back: WriteBackMode::default(),
      pending: TaskTracker::new(),
    }
  }

  pub fn with_write_back(mut self, write_back: WriteBackMode) -> Self {
    self.write_back = write_back;
    self
  }

  /// Whether the cache holds `key`. Only a routing hint: the entry may
  /// expire before it is read.
  pub async fn exists(
    &self,
    key: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<bool, CacheError> {
    let key = key.to_string();
    run_store(&self.store, cancel, move |store| {
      store.exists::<ForecastResult>(&key)
    })
    .await
  }

  /// Read `key` from the cache, failing with a miss if it is absent.
  pub async fn read_cached(
    &self,
    key: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, CacheError> {
    let owned = key.to_string();
    let found = run_store(&self.store, cancel, move |store| {
      store.get::<ForecastResult>(&owned)
    })
    .await?;

    found.ok_or_else(|| CacheError::Miss {
      key: key.to_string(),
    })
  }

  /// Resolve `key` upstream and write the result back to the cache.
  ///
  /// A failed write is logged and otherwise ignored; the resolved forecast
  /// is still returned.
  pub async fn resolve_and_cache(
    &self,
    key: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, ResolutionError> {
    let forecast = self.pipeline.resolve(key, cancel).await?;

    match self.write_back {
      WriteBackMode::Inline => {
        let written =
          write_entry(&self.store, key.to_string(), forecast.clone(), self.ttl, cancel).await;
        match written {
          Ok(()) => tracing::debug!(city = %key, "Cached forecast"),
          Err(e) => tracing::warn!(city = %key, "Error adding city weather to cache: {}", e),
        }
      }
      WriteBackMode::Detached => self.spawn_write(key, forecast.clone(), cancel),
    }

    Ok(forecast)
  }

  /// Serve `key` from the cache if present, otherwise resolve and cache it.
  pub async fn get_or_resolve(
    &self,
    key: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<CacheResult<ForecastResult>, LookupError> {
    let hit = match self.exists(key, cancel).await {
      Ok(hit) => hit,
      Err(CacheError::Cancelled) => return Err(CacheError::Cancelled.into()),
      Err(e) => {
        tracing::warn!(city = %key, "Cache existence check failed, resolving instead: {}", e);
        false
      }
    };

    if hit {
      tracing::debug!(city = %key, "Cache hit");
      return match self.read_cached(key, cancel).await {
        Ok(forecast) => Ok(CacheResult::from_cache(forecast)),
        Err(CacheError::Miss { key }) => Err(LookupError::ExpiredHit { key }),
        Err(e) => Err(e.into()),
      };
    }

    tracing::debug!(city = %key, "Cache miss");
    let forecast = self.resolve_and_cache(key, cancel).await?;
    Ok(CacheResult::from_network(forecast))
  }

  /// Wait until no detached write-back is in flight.
  ///
  /// The tracker stays closed afterwards. Closing does not stop new
  /// write-backs from being tracked, it only lets `wait` return once the
  /// tracker is empty, so concurrent callers can all wait safely.
  pub async fn wait_for_write_backs(&self) {
    self.pending.close();
    self.pending.wait().await;
  }

  /// Start the write-back without waiting for it.
  ///
  /// The task reports failures over a one-slot channel that is polled once,
  /// right away. An empty channel means the write is still running, not that
  /// it succeeded; the task logs its own outcome either way.
  fn spawn_write(&self, key: &CityKey, forecast: ForecastResult, cancel: &CancellationToken) {
    let (tx, mut rx) = mpsc::channel::<CacheError>(1);
    let store = Arc::clone(&self.store);
    let cancel = cancel.clone();
    let ttl = self.ttl;
    let key = key.to_string();
    let city = key.clone();

    self.pending.spawn(async move {
      match write_entry(&store, key.clone(), forecast, ttl, &cancel).await {
        Ok(()) => tracing::debug!(city = %key, "Cached forecast"),
        Err(e) => {
          tracing::warn!(city = %key, "Error adding city weather to cache: {}", e);
          // Ignore send errors - nobody may be listening anymore
          let _ = tx.try_send(e);
        }
      }
    });

    match rx.try_recv() {
      Ok(e) => tracing::debug!(city = %city, "Cache write-back already failed: {}", e),
      Err(TryRecvError::Empty) => tracing::trace!(city = %city, "Cache write-back pending"),
      Err(TryRecvError::Disconnected) => {
        tracing::trace!(city = %city, "Cache write-back finished")
      }
    }
  }
}

async fn write_entry<S: CacheStore>(
  store: &Arc<S>,
  key: String,
  forecast: ForecastResult,
  ttl: Duration,
  cancel: &CancellationToken,
) -> Result<(), CacheError> {
  run_store(store, cancel, move |store| store.set(&key, &forecast, ttl)).await
}

/// Run a blocking store call on the blocking pool, giving up if `cancel`
/// fires first. No lock is held while waiting.
async fn run_store<S, T, F>(
  store: &Arc<S>,
  cancel: &CancellationToken,
  op: F,
) -> Result<T, CacheError>
where
  S: CacheStore,
  T: Send + 'static,
  F: FnOnce(&S) -> color_eyre::Result<T> + Send + 'static,
{
  if cancel.is_cancelled() {
    return Err(CacheError::Cancelled);
  }

  let store = Arc::clone(store);
  let task = tokio::task::spawn_blocking(move || op(&store));

  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(CacheError::Cancelled),
    joined = task => match joined {
      Ok(result) => result.map_err(CacheError::Backend),
      Err(e) => Err(CacheError::Backend(eyre!("Cache task failed: {}", e))),
    },
  }
}
