//! Abort Time Logger: correlation engine.
//!
//! Correlates abort notifications from the monitored channels of two rings
//! into abort incidents: one session per ring, both-ring merge inside a
//! short window, earliest-timestamp reconciliation, and reset-count
//! bookkeeping. Incidents and per-channel signal records go to an
//! [`IncidentStore`]; live channel values come from a [`ChannelSnapshotSource`].

pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod logging;
pub mod queue;
pub mod reset;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod types;

pub use channels::{ChannelEntry, ChannelList};
pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle, TickReport};
pub use error::{EngineError, StoreError};
pub use reset::ResetCounter;
pub use snapshot::{ChannelSnapshot, ChannelSnapshotSource, ChannelUpdate, SnapshotBoard};
pub use store::{IncidentStore, MemoryStore, PgStore};
pub use types::{AbortEvent, Incident, IncidentId, Ring, SignalRecord, Timestamp};
