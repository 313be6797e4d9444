//! Caching implementations for weather types.

use crate::cache::Cacheable;

use super::types::ForecastResult;

impl Cacheable for ForecastResult {
  fn entity_type() -> &'static str {
    "forecast"
  }
}
