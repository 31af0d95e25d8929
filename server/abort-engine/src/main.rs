//! Binary entrypoint: read live channel values as JSON lines from stdin,
//! correlate aborts and persist incidents to PostgreSQL.
//!
//! The channel list is refreshed from the per-ring list files (when both are
//! given) and then read back from the store; it does not change during a run.
//! Runs until interrupted.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use abort_engine::logging::{init_logging, LogConfig, LogFormat};
use abort_engine::{channels, feed, queue};
use abort_engine::{Engine, EngineConfig, EngineError, PgStore, ResetCounter, SnapshotBoard};

#[derive(Debug, Parser)]
#[command(name = "abort-engine", about = "Abort time logger: correlates channel aborts into incidents")]
struct Args {
  /// PostgreSQL connection URL
  #[arg(short = 'u', long, env = "DATABASE_URL")]
  database_url: String,

  /// HER channel list (`name[, message]` per line)
  #[arg(short = 'H', long)]
  her_list: Option<PathBuf>,

  /// LER channel list (`name[, message]` per line)
  #[arg(short = 'L', long)]
  ler_list: Option<PathBuf>,

  /// Tick interval in milliseconds
  #[arg(long, default_value_t = 100)]
  interval_ms: u64,

  #[arg(long, env = "ABORT_LOG_LEVEL", default_value = "info")]
  log_level: String,

  #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
  log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let args = Args::parse();
  init_logging(&LogConfig {
    level: args.log_level.clone(),
    format: args.log_format,
  })?;

  let lists = match (&args.her_list, &args.ler_list) {
    (Some(her), Some(ler)) => Some(channels::load_ring_lists(her, ler)?),
    (None, None) => None,
    _ => return Err(EngineError::config("channel lists must be provided for both rings").into()),
  };

  let store = PgStore::connect(&args.database_url).await?;
  store.migrate().await?;
  if let Some(list) = &lists {
    store.register_channels(list).await?;
    info!(channels = list.len(), "channel list updated");
  }
  let channels = store.fetch_current_channels().await?;
  if channels.is_empty() {
    warn!("no channels configured");
  }

  let (tx, queue) = queue::channel();
  let board = Arc::new(SnapshotBoard::new(channels.ids(), tx));
  let resets = ResetCounter::new();
  let config = EngineConfig {
    tick_interval: Duration::from_millis(args.interval_ms),
    ..EngineConfig::default()
  };
  let mut engine = Engine::new(config, &channels, queue, resets.clone(), board.clone(), Arc::new(store));
  let mut handle = engine.handle();

  // Detached: a blocking stdin read must not hold up shutdown.
  std::thread::spawn(move || {
    if let Err(e) = feed::run(io::stdin().lock(), &board, &resets) {
      warn!(error = %e, "feed failed");
    }
  });

  let mut runner = tokio::spawn(async move { engine.run().await });
  tokio::select! {
    finished = &mut runner => {
      finished??;
      return Ok(());
    }
    signal = tokio::signal::ctrl_c() => {
      signal?;
      info!("interrupted; stopping");
    }
  }

  handle.stop().await;
  runner.await??;
  Ok(())
}
