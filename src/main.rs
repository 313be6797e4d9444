mod cache;
mod config;
mod logging;
mod lookup;
#[cfg(test)]
mod testing;
mod weather;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use cache::{CacheStore, NoopStorage, TieredStore};
use config::Config;
use lookup::{CacheOrchestrator, ErrorBody, FailureClass, LookupService};
use weather::{HttpWeatherSource, ResolutionPipeline};

#[derive(Parser, Debug)]
#[command(name = "skycache")]
#[command(about = "City weather lookups behind a two-tier cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/skycache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Skip the cache entirely
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Weather for a city, served from cache or fetched and cached
  Lookup { city: String },
  /// Weather for a city from the cache only
  Cached { city: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let source = HttpWeatherSource::new(&config.weather, Config::get_api_key()?)?;
  let pipeline = ResolutionPipeline::new(source);

  if args.no_cache || !config.cache.enabled {
    tracing::debug!("Caching disabled");
    let orchestrator = CacheOrchestrator::new(pipeline, NoopStorage, config.cache.ttl());
    run(LookupService::new(orchestrator), args.command).await
  } else {
    let store = TieredStore::open(&config.cache)?;
    let orchestrator = CacheOrchestrator::new(pipeline, store, config.cache.ttl())
      .with_write_back(config.cache.write_back);
    run(LookupService::new(orchestrator), args.command).await
  }
}

async fn run<S: CacheStore>(
  service: LookupService<HttpWeatherSource, S>,
  command: Command,
) -> Result<ExitCode> {
  // Ctrl-C cancels whatever is in flight
  let cancel = CancellationToken::new();
  let interrupt = {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        cancel.cancel();
      }
    })
  };

  let outcome = match &command {
    Command::Lookup { city } => service.lookup(city, &cancel).await,
    Command::Cached { city } => service.lookup_cached_only(city, &cancel).await,
  };

  let exit = match outcome {
    Ok(forecast) => {
      println!("{}", serde_json::to_string_pretty(&forecast)?);
      ExitCode::SUCCESS
    }
    Err(err) => {
      tracing::debug!(kind = ?err.kind(), "Lookup failed: {}", err);
      println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
      match err.failure_class() {
        FailureClass::Client => ExitCode::from(2),
        FailureClass::Server => ExitCode::from(1),
      }
    }
  };

  // The answer is out; let detached cache writes land before exiting.
  service.flush().await;
  interrupt.abort();

  Ok(exit)
}
