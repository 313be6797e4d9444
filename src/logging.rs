//! Tracing setup.
//!
//! Logs go to stderr so stdout stays clean for JSON output, or to a daily
//! rolling file when a log directory is configured.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable that overrides the configured filter.
const LOG_ENV: &str = "SKYCACHE_LOG";

/// Install the global subscriber.
///
/// The returned guard flushes buffered file output on drop and must be held
/// for the life of the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = build_filter(config)?;

  match &config.directory {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::daily(dir, "skycache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(None)
    }
  }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
  if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
    return Ok(filter);
  }

  EnvFilter::try_new(&config.level)
    .map_err(|e| eyre!("Invalid log level '{}': {}", config.level, e))
}
