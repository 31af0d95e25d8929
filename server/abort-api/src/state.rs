//! Shared handler state.

use async_trait::async_trait;
use std::sync::Arc;

use abort_engine::store::{SignalFilter, SignalRow};
use abort_engine::{PgStore, StoreError};

/// Where signal rows are read from.
#[async_trait]
pub trait SignalSource: Send + Sync {
  async fn fetch_abort_signals(&self, filter: &SignalFilter) -> Result<Vec<SignalRow>, StoreError>;
}

#[async_trait]
impl SignalSource for PgStore {
  async fn fetch_abort_signals(&self, filter: &SignalFilter) -> Result<Vec<SignalRow>, StoreError> {
    PgStore::fetch_abort_signals(self, filter).await
  }
}

pub struct AppState {
  pub signals: Arc<dyn SignalSource>,
}
