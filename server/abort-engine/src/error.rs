//! Structured error types for the abort engine and its store.

use thiserror::Error;

use crate::types::{IncidentId, Timestamp};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("unknown channel: {0}")]
  UnknownChannel(String),

  #[error("duplicate channel: {0}")]
  DuplicateChannel(String),

  #[error("config: {0}")]
  Config(String),

  #[error("parse: {0}")]
  Parse(String),

  #[error("store: {0}")]
  Store(#[from] StoreError),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

impl EngineError {
  pub fn parse(msg: impl Into<String>) -> Self {
    Self::Parse(msg.into())
  }

  pub fn config(msg: impl Into<String>) -> Self {
    Self::Config(msg.into())
  }
}

/// Failures reported by an incident store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("an incident already exists at {0}")]
  DuplicateIncidentTime(Timestamp),

  #[error("unknown incident {0}")]
  UnknownIncident(IncidentId),

  #[error("corrupt row: {0}")]
  Corrupt(String),

  #[error("database: {0}")]
  Database(#[from] sqlx_core::Error),
}
