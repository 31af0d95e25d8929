//! Binary entrypoint for the abort reporting API.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use abort_api::AppState;
use abort_engine::logging::{init_logging, LogConfig};
use abort_engine::{EngineError, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  init_logging(&LogConfig::default())?;

  let database_url =
    std::env::var("DATABASE_URL").map_err(|_| EngineError::config("DATABASE_URL must be set"))?;
  let port: u16 = std::env::var("PORT")
    .unwrap_or_else(|_| "5005".into())
    .parse()
    .map_err(|_| EngineError::config("PORT must be a valid u16"))?;

  let store = PgStore::connect(&database_url).await?;
  store.migrate().await?;
  let app = abort_api::router(Arc::new(AppState {
    signals: Arc::new(store),
  }));

  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  info!(%addr, "abort-api listening");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;

  Ok(())
}
