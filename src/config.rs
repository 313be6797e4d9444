use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub weather: WeatherConfig,
  pub cache: CacheConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
  /// Scheme + host of the weather API
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for WeatherConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.openweathermap.org".to_string(),
      timeout_secs: 10,
    }
  }
}

impl WeatherConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// When a freshly resolved forecast is written back to the cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteBackMode {
  /// Fire-and-forget: the caller gets its result without waiting for the write
  #[default]
  Detached,
  /// The write finishes before the caller gets its result
  Inline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Set to false to bypass caching entirely
  pub enabled: bool,
  /// Lifetime of a cached forecast
  pub ttl_secs: u64,
  /// Max entries held in the in-process tier
  pub local_capacity: u64,
  /// Upper bound on how long the in-process tier keeps an entry
  pub local_ttl_secs: u64,
  /// Shared tier database (defaults to the user data directory)
  pub path: Option<PathBuf>,
  pub write_back: WriteBackMode,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_secs: 600,
      local_capacity: 1000,
      local_ttl_secs: 60,
      path: None,
      write_back: WriteBackMode::Detached,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }

  pub fn local_ttl(&self) -> Duration {
    Duration::from_secs(self.local_ttl_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive, e.g. "info" or "skycache=debug"
  pub level: String,
  /// Write logs to a daily rolling file here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./skycache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/skycache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("skycache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("skycache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the weather API key from environment variables.
  ///
  /// Checks SKYCACHE_API_KEY first, then OPENWEATHER_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SKYCACHE_API_KEY")
      .or_else(|_| std::env::var("OPENWEATHER_API_KEY"))
      .map_err(|_| {
        eyre!(
          "Weather API key not found. Set SKYCACHE_API_KEY or OPENWEATHER_API_KEY environment variable."
        )
      })
  }
}
