use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Canonical, case-insensitive city name used for every cache and upstream
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CityKey(String);

impl CityKey {
  /// Canonicalize a raw city name: trimmed and lower-cased.
  /// Returns None if nothing is left.
  pub fn parse(raw: &str) -> Option<Self> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
      None
    } else {
      Some(Self(key))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Upstream sends `null` for some absent fields; treat it like a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A geocoding candidate for a city name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coordinates {
  pub name: String,
  #[serde(rename = "lat")]
  pub latitude: f64,
  #[serde(rename = "lon")]
  pub longitude: f64,
  #[serde(deserialize_with = "null_as_default")]
  pub country: String,
  #[serde(deserialize_with = "null_as_default")]
  pub state: String,
}

/// Forecast for a city: metadata plus time-ordered entries.
///
/// This is both the cached value and what callers receive. Field names follow
/// the upstream forecast payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastResult {
  pub city: CityMetadata,
  #[serde(rename = "list")]
  pub entries: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityMetadata {
  pub id: i64,
  pub name: String,
  pub coord: Coord,
  #[serde(deserialize_with = "null_as_default")]
  pub country: String,
  #[serde(deserialize_with = "null_as_default")]
  pub population: i64,
  /// Offset from UTC in seconds
  pub timezone: i32,
  pub sunrise: i64,
  pub sunset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coord {
  pub lat: f64,
  pub lon: f64,
}

/// A single forecast step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastEntry {
  /// Unix timestamp of the forecasted time
  pub dt: i64,
  pub main: Measurements,
  pub weather: Vec<Condition>,
  pub clouds: Clouds,
  pub wind: Wind,
  #[serde(deserialize_with = "null_as_default")]
  pub visibility: i32,
  /// Probability of precipitation, 0.0 - 1.0
  #[serde(deserialize_with = "null_as_default")]
  pub pop: f32,
  pub sys: PartOfDay,
  #[serde(deserialize_with = "null_as_default")]
  pub dt_txt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurements {
  pub temp: f32,
  pub feels_like: f32,
  pub temp_min: f32,
  pub temp_max: f32,
  pub pressure: i32,
  #[serde(deserialize_with = "null_as_default")]
  pub sea_level: i32,
  #[serde(deserialize_with = "null_as_default")]
  pub grnd_level: i32,
  pub humidity: i32,
  pub temp_kf: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
  pub id: i32,
  pub main: String,
  #[serde(deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(deserialize_with = "null_as_default")]
  pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Clouds {
  pub all: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wind {
  pub speed: f32,
  pub deg: f32,
  #[serde(deserialize_with = "null_as_default")]
  pub gust: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartOfDay {
  /// "d" or "n"
  #[serde(deserialize_with = "null_as_default")]
  pub pod: String,
}
