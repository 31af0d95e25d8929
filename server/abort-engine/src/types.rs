//! Core types for the abort engine (rings, timestamps, events, records).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::EngineError;

const NANOS_PER_SEC: i128 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

/// One of the two monitored rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ring {
  Her,
  Ler,
}

impl Ring {
  pub const ALL: [Ring; 2] = [Ring::Her, Ring::Ler];

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "HER" => Some(Self::Her),
      "LER" => Some(Self::Ler),
      _ => None,
    }
  }

  pub fn opposite(self) -> Self {
    match self {
      Self::Her => Self::Ler,
      Self::Ler => Self::Her,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Her => "HER",
      Self::Ler => "LER",
    }
  }

  pub(crate) fn index(self) -> usize {
    match self {
      Self::Her => 0,
      Self::Ler => 1,
    }
  }
}

impl fmt::Display for Ring {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Seconds + nanoseconds since the Unix epoch, as reported by a channel.
///
/// Ordering is chronological. The text form (`YYYY-MM-DD HH:MM:SS.nnnnnnnnn`,
/// UTC) is what the store persists; it sorts the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
  pub sec: i64,
  pub nsec: u32,
}

impl Timestamp {
  pub const fn new(sec: i64, nsec: u32) -> Self {
    Self { sec, nsec }
  }

  pub fn now() -> Self {
    let now = Utc::now();
    Self {
      sec: now.timestamp(),
      nsec: now.timestamp_subsec_nanos(),
    }
  }

  fn total_nanos(self) -> i128 {
    self.sec as i128 * NANOS_PER_SEC + self.nsec as i128
  }

  fn from_total_nanos(nanos: i128) -> Self {
    let sec = nanos.div_euclid(NANOS_PER_SEC);
    if sec > i64::MAX as i128 {
      return Self { sec: i64::MAX, nsec: 999_999_999 };
    }
    if sec < i64::MIN as i128 {
      return Self { sec: i64::MIN, nsec: 0 };
    }
    Self {
      sec: sec as i64,
      nsec: nanos.rem_euclid(NANOS_PER_SEC) as u32,
    }
  }

  /// Whether this instant maps onto a calendar date/time.
  pub fn is_representable(self) -> bool {
    self.nsec < 1_000_000_000 && self.to_datetime().is_some()
  }

  /// `self - d`, saturating at the representable range.
  pub fn saturating_sub(self, d: Duration) -> Self {
    Self::from_total_nanos(self.total_nanos().saturating_sub(d.as_nanos() as i128))
  }

  /// Drop the sub-microsecond digits.
  pub fn truncate_to_micros(self) -> Self {
    Self {
      sec: self.sec,
      nsec: self.nsec - self.nsec % 1_000,
    }
  }

  pub fn to_datetime(self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(self.sec, self.nsec)
  }

  /// Milliseconds since the epoch (sub-millisecond digits truncated).
  pub fn as_millis(self) -> i64 {
    self
      .sec
      .saturating_mul(1_000)
      .saturating_add((self.nsec / 1_000_000) as i64)
  }

  /// Parse the persisted text form. Any number of fractional digits (up to 9) is accepted.
  pub fn parse(s: &str) -> Result<Self, EngineError> {
    let dt = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
      .map_err(|e| EngineError::parse(format!("timestamp {:?}: {}", s, e)))?
      .and_utc();
    Ok(Self {
      sec: dt.timestamp(),
      nsec: dt.timestamp_subsec_nanos(),
    })
  }
}

impl fmt::Display for Timestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.to_datetime() {
      Some(dt) => write!(f, "{}.{:09}", dt.format("%Y-%m-%d %H:%M:%S"), self.nsec),
      None => write!(f, "{}.{:09}", self.sec, self.nsec),
    }
  }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Store-assigned incident (abort) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub i64);

impl fmt::Display for IncidentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Store-assigned signal record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalId(pub i64);

// ---------------------------------------------------------------------------
// Channels and events
// ---------------------------------------------------------------------------

/// Engine-local view of one configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
  pub id: String,
  pub ring: Ring,
  pub message: String,
  /// Last abort flag the engine processed for this channel.
  pub last_abort: bool,
}

/// One queued abort-flag notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortEvent {
  pub channel: String,
  pub abort: bool,
}

impl AbortEvent {
  pub fn new(channel: impl Into<String>, abort: bool) -> Self {
    Self {
      channel: channel.into(),
      abort,
    }
  }
}

// ---------------------------------------------------------------------------
// Persisted shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Incident {
  pub id: IncidentId,
  pub time: Timestamp,
}

/// One channel's abort-time observation. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalRecord {
  pub incident_id: Option<IncidentId>,
  pub channel: String,
  pub message: String,
  /// Capture time of the abort flag value itself.
  pub channel_ts: Timestamp,
  pub abort_ts: Timestamp,
  pub reset_count: i64,
  pub trigger_count: i64,
  pub interrupt_count: i64,
}
