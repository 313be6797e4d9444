use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use url::Url;

use crate::config::WeatherConfig;

/// A single query parameter. Order is preserved when the URL is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
  pub key: String,
  pub value: String,
}

impl QueryParam {
  pub fn new(key: &str, value: impl Into<String>) -> Self {
    Self {
      key: key.to_string(),
      value: value.into(),
    }
  }
}

/// Describes one upstream request: a path relative to the API host plus
/// query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
  pub path: String,
  pub query: Vec<QueryParam>,
}

/// Failure talking to the weather API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
  #[error("invalid request url: {0}")]
  Url(#[from] url::ParseError),
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("weather API returned status {status}")]
  Status { status: u16 },
  #[error("failed to decode weather data: {0}")]
  Decode(#[from] serde_json::Error),
}

impl SourceError {
  /// Whether the API rejected our credentials.
  pub fn is_unauthorized(&self) -> bool {
    matches!(self, Self::Status { status } if *status == StatusCode::UNAUTHORIZED.as_u16())
  }
}

/// Something that can answer weather API requests.
pub trait WeatherSource: Send + Sync {
  /// API key to send with each request.
  fn api_key(&self) -> &str;

  /// Perform the request and decode the JSON response body into `T`.
  fn make_request<T>(
    &self,
    config: &RequestConfig,
  ) -> impl Future<Output = Result<T, SourceError>> + Send
  where
    T: DeserializeOwned + Send;
}

/// Weather API client over HTTP.
#[derive(Clone)]
pub struct HttpWeatherSource {
  client: Client,
  base_url: Url,
  api_key: String,
}

impl HttpWeatherSource {
  pub fn new(config: &WeatherConfig, api_key: String) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid weather base_url '{}': {}", config.base_url, e))?;

    let client = Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create weather client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      api_key,
    })
  }

  fn build_url(&self, config: &RequestConfig) -> Result<Url, url::ParseError> {
    let mut url = self.base_url.join(&config.path)?;
    {
      let mut pairs = url.query_pairs_mut();
      for param in &config.query {
        pairs.append_pair(&param.key, &param.value);
      }
    }
    Ok(url)
  }
}

impl WeatherSource for HttpWeatherSource {
  fn api_key(&self) -> &str {
    &self.api_key
  }

  async fn make_request<T>(&self, config: &RequestConfig) -> Result<T, SourceError>
  where
    T: DeserializeOwned + Send,
  {
    let url = self.build_url(config)?;
    // The query string carries the API key, so only the path is logged.
    tracing::debug!(path = %config.path, "Weather API request");

    let response = self
      .client
      .get(url)
      .header(ACCEPT, "application/json")
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(SourceError::Status {
        status: status.as_u16(),
      });
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }
}
