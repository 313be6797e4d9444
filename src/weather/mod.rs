//! Weather domain: the upstream API client, the resolution pipeline, and the
//! types that flow through them.

mod cache;
pub mod client;
pub mod pipeline;
pub mod types;

pub use client::{HttpWeatherSource, WeatherSource};
pub use pipeline::{ResolutionError, ResolutionPipeline};
pub use types::{CityKey, ForecastResult};
