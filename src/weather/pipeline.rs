//! City name -> coordinates -> forecast.

use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::client::{QueryParam, RequestConfig, SourceError, WeatherSource};
use super::types::{CityKey, Coordinates, ForecastResult};

pub const GEOCODE_PATH: &str = "/geo/1.0/direct";
pub const FORECAST_PATH: &str = "/data/2.5/forecast";

const PARAM_QUERY: &str = "q";
const PARAM_LAT: &str = "lat";
const PARAM_LON: &str = "lon";
const PARAM_APP_ID: &str = "appid";

/// Which upstream call a resolution failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Geocode,
  Forecast,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Geocode => f.write_str("geocode"),
      Self::Forecast => f.write_str("forecast"),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
  #[error("no coordinates found for city '{city}'")]
  NotFound { city: String },
  #[error("{stage} request was rejected; check that the API key is valid")]
  InvalidCredentials { stage: Stage },
  #[error("{stage} request failed: {source}")]
  Upstream {
    stage: Stage,
    #[source]
    source: SourceError,
  },
  #[error("lookup cancelled")]
  Cancelled,
}

impl ResolutionError {
  fn from_source(stage: Stage, source: SourceError) -> Self {
    if source.is_unauthorized() {
      Self::InvalidCredentials { stage }
    } else {
      Self::Upstream { stage, source }
    }
  }

  /// The stage that failed, if the failure is tied to one.
  pub fn stage(&self) -> Option<Stage> {
    match self {
      Self::NotFound { .. } => Some(Stage::Geocode),
      Self::InvalidCredentials { stage } | Self::Upstream { stage, .. } => Some(*stage),
      Self::Cancelled => None,
    }
  }
}

/// Resolves a city to its forecast with two chained upstream calls. Never
/// touches the cache.
pub struct ResolutionPipeline<W> {
  source: W,
}

impl<W: WeatherSource> ResolutionPipeline<W> {
  pub fn new(source: W) -> Self {
    Self { source }
  }

  pub fn geocode_request(&self, city: &CityKey) -> RequestConfig {
    RequestConfig {
      path: GEOCODE_PATH.to_string(),
      query: vec![
        QueryParam::new(PARAM_QUERY, city.as_str()),
        QueryParam::new(PARAM_APP_ID, self.source.api_key()),
      ],
    }
  }

  /// Coordinates are rendered with six fractional digits so identical
  /// coordinates always produce identical requests.
  pub fn forecast_request(&self, coordinates: &Coordinates) -> RequestConfig {
    RequestConfig {
      path: FORECAST_PATH.to_string(),
      query: vec![
        QueryParam::new(PARAM_LAT, format!("{:.6}", coordinates.latitude)),
        QueryParam::new(PARAM_LON, format!("{:.6}", coordinates.longitude)),
        QueryParam::new(PARAM_APP_ID, self.source.api_key()),
      ],
    }
  }

  /// Resolve a city name to its best coordinate match.
  ///
  /// The first candidate in source order wins.
  pub async fn resolve_coordinates(
    &self,
    city: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<Coordinates, ResolutionError> {
    let request = self.geocode_request(city);
    let candidates = until_cancelled(
      cancel,
      self.source.make_request::<Vec<Coordinates>>(&request),
    )
    .await?
    .map_err(|e| ResolutionError::from_source(Stage::Geocode, e))?;

    candidates
      .into_iter()
      .next()
      .ok_or_else(|| ResolutionError::NotFound {
        city: city.to_string(),
      })
  }

  /// Fetch the forecast for a coordinate pair. All forecast entries are kept.
  pub async fn resolve_forecast(
    &self,
    coordinates: &Coordinates,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, ResolutionError> {
    let request = self.forecast_request(coordinates);
    until_cancelled(cancel, self.source.make_request::<ForecastResult>(&request))
      .await?
      .map_err(|e| ResolutionError::from_source(Stage::Forecast, e))
  }

  /// Geocode then forecast. The forecast call only happens once geocoding
  /// has produced a candidate; either failure ends the lookup with no value.
  pub async fn resolve(
    &self,
    city: &CityKey,
    cancel: &CancellationToken,
  ) -> Result<ForecastResult, ResolutionError> {
    let coordinates = self.resolve_coordinates(city, cancel).await?;
    tracing::debug!(
      city = %city,
      lat = coordinates.latitude,
      lon = coordinates.longitude,
      "Resolved coordinates"
    );

    let forecast = self.resolve_forecast(&coordinates, cancel).await?;
    tracing::debug!(city = %city, entries = forecast.entries.len(), "Resolved forecast");

    Ok(forecast)
  }
}

/// Run `fut` unless `cancel` fires first. Cancellation wins ties.
async fn until_cancelled<F: Future>(
  cancel: &CancellationToken,
  fut: F,
) -> Result<F::Output, ResolutionError> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(ResolutionError::Cancelled),
    out = fut => Ok(out),
  }
}
