//! In-memory doubles for the weather source and the cache store.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::{CacheStore, Cacheable};
use crate::weather::client::{RequestConfig, SourceError, WeatherSource};
use crate::weather::types::{CityMetadata, ForecastEntry, ForecastResult};

/// Canned answer for one request path.
#[derive(Debug, Clone)]
pub enum Reply {
  Json(Value),
  Status(u16),
}

/// Weather source that answers from a path -> reply script and records every
/// request it sees. Clones share the script and the call log.
#[derive(Clone, Default)]
pub struct ScriptedSource {
  replies: Arc<HashMap<String, Reply>>,
  calls: Arc<Mutex<Vec<RequestConfig>>>,
  delay: Option<Duration>,
}

impl ScriptedSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, path: &str, reply: Reply) -> Self {
    Arc::make_mut(&mut self.replies).insert(path.to_string(), reply);
    self
  }

  /// Delay every reply, to hold requests in flight.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn calls(&self) -> Vec<RequestConfig> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, path: &str) -> usize {
    self.calls().iter().filter(|c| c.path == path).count()
  }
}

impl WeatherSource for ScriptedSource {
  fn api_key(&self) -> &str {
    "test-key"
  }

  async fn make_request<T>(&self, config: &RequestConfig) -> Result<T, SourceError>
  where
    T: DeserializeOwned + Send,
  {
    self.calls.lock().unwrap().push(config.clone());

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    match self.replies.get(&config.path) {
      Some(Reply::Json(value)) => Ok(serde_json::from_value(value.clone())?),
      Some(Reply::Status(status)) => Err(SourceError::Status { status: *status }),
      None => Err(SourceError::Status { status: 404 }),
    }
  }
}

#[derive(Default)]
struct StoreState {
  entries: Mutex<HashMap<String, Value>>,
  set_keys: Mutex<Vec<(String, Duration)>>,
  gets: AtomicUsize,
  exists_override: Mutex<Option<bool>>,
  fail_exists: AtomicBool,
  fail_gets: AtomicBool,
  fail_sets: AtomicBool,
  set_delay: Mutex<Option<Duration>>,
}

/// Cache store over a HashMap that records writes and can be told to fail.
/// Clones share state, so a test can keep a handle after moving one into
/// the code under test.
#[derive(Clone, Default)]
pub struct MemoryStore {
  state: Arc<StoreState>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_entry<T: Cacheable>(self, key: &str, value: &T) -> Self {
    let value = serde_json::to_value(value).unwrap();
    self.state.entries.lock().unwrap().insert(key.to_string(), value);
    self
  }

  /// Answer every existence check with `exists`, whatever is stored.
  pub fn reporting_exists(self, exists: bool) -> Self {
    *self.state.exists_override.lock().unwrap() = Some(exists);
    self
  }

  pub fn failing_exists(self) -> Self {
    self.state.fail_exists.store(true, Ordering::SeqCst);
    self
  }

  pub fn failing_gets(self) -> Self {
    self.state.fail_gets.store(true, Ordering::SeqCst);
    self
  }

  pub fn failing_sets(self) -> Self {
    self.state.fail_sets.store(true, Ordering::SeqCst);
    self
  }

  /// Make each write block for `delay` before it lands.
  pub fn with_set_delay(self, delay: Duration) -> Self {
    *self.state.set_delay.lock().unwrap() = Some(delay);
    self
  }

  /// Keys of every write attempt that ran to completion, in order.
  pub fn set_keys(&self) -> Vec<String> {
    self
      .state
      .set_keys
      .lock()
      .unwrap()
      .iter()
      .map(|(key, _)| key.clone())
      .collect()
  }

  pub fn set_ttls(&self) -> Vec<Duration> {
    self
      .state
      .set_keys
      .lock()
      .unwrap()
      .iter()
      .map(|(_, ttl)| *ttl)
      .collect()
  }

  pub fn get_count(&self) -> usize {
    self.state.gets.load(Ordering::SeqCst)
  }

  pub fn stored<T: Cacheable>(&self, key: &str) -> Option<T> {
    self
      .state
      .entries
      .lock()
      .unwrap()
      .get(key)
      .map(|value| serde_json::from_value(value.clone()).unwrap())
  }
}

impl CacheStore for MemoryStore {
  fn exists<T: Cacheable>(&self, key: &str) -> Result<bool> {
    if self.state.fail_exists.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }
    if let Some(exists) = *self.state.exists_override.lock().unwrap() {
      return Ok(exists);
    }
    Ok(self.state.entries.lock().unwrap().contains_key(key))
  }

  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    self.state.gets.fetch_add(1, Ordering::SeqCst);
    if self.state.fail_gets.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }

    let value = self.state.entries.lock().unwrap().get(key).cloned();
    value
      .map(|value| serde_json::from_value(value).map_err(|e| eyre!("bad entry: {}", e)))
      .transpose()
  }

  fn set<T: Cacheable>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    let delay = *self.state.set_delay.lock().unwrap();
    if let Some(delay) = delay {
      std::thread::sleep(delay);
    }

    self
      .state
      .set_keys
      .lock()
      .unwrap()
      .push((key.to_string(), ttl));

    if self.state.fail_sets.load(Ordering::SeqCst) {
      return Err(eyre!("cache is read-only"));
    }

    let value = serde_json::to_value(value)?;
    self.state.entries.lock().unwrap().insert(key.to_string(), value);
    Ok(())
  }
}

/// Geocode payload with one candidate.
pub fn chicago_coordinates() -> Value {
  json!([{"name": "Chicago", "lat": 123.123000, "lon": 456.456000, "country": "US"}])
}

/// Forecast payload with one entry.
pub fn chicago_forecast() -> Value {
  json!({"city": {"name": "chicago"}, "list": [{"dt": 123}]})
}

/// `chicago_forecast()` as a decoded value.
pub fn chicago_result() -> ForecastResult {
  ForecastResult {
    city: CityMetadata {
      name: "chicago".to_string(),
      ..Default::default()
    },
    entries: vec![ForecastEntry {
      dt: 123,
      ..Default::default()
    }],
  }
}
