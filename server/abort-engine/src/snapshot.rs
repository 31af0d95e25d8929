//! Latest per-channel values and the source trait the engine reads them through.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::error::EngineError;
use crate::queue::EventSender;
use crate::types::{AbortEvent, Timestamp};

/// A value together with the time it was captured at its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample<T> {
  pub value: T,
  pub captured_at: Timestamp,
}

/// Everything the engine needs to know about one channel at abort time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSnapshot {
  pub abort: Sample<bool>,
  pub abort_sec: Sample<i64>,
  pub abort_nsec: Sample<u32>,
  pub trigger_count: i64,
  pub interrupt_count: i64,
}

impl ChannelSnapshot {
  /// The channel's abort timestamp, or `None` while the seconds/nanoseconds
  /// fields have not caught up with the abort flag.
  ///
  /// Both fields must have been captured after `flag capture - validity`.
  pub fn abort_timestamp(&self, validity: Duration) -> Option<Timestamp> {
    let floor = self.abort.captured_at.saturating_sub(validity);
    if self.abort_sec.captured_at > floor && self.abort_nsec.captured_at > floor {
      Some(Timestamp::new(self.abort_sec.value, self.abort_nsec.value))
    } else {
      None
    }
  }

  /// Time the abort flag value itself was captured.
  pub fn channel_timestamp(&self) -> Timestamp {
    self.abort.captured_at
  }
}

/// Read access to live channel values.
pub trait ChannelSnapshotSource: Send + Sync {
  /// Latest snapshot, or `None` if the source does not know the channel.
  fn snapshot(&self, channel: &str) -> Option<ChannelSnapshot>;

  /// Whether every channel has delivered its initial value. Startup
  /// reconciliation waits for this.
  fn is_ready(&self) -> bool {
    true
  }
}

// ---------------------------------------------------------------------------
// Snapshot board
// ---------------------------------------------------------------------------

/// Partial update of one channel. Every present field takes `captured_at`
/// (default: now) as its capture time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelUpdate {
  pub channel: String,
  #[serde(default)]
  pub captured_at: Option<Timestamp>,
  #[serde(default)]
  pub abort: Option<bool>,
  #[serde(default)]
  pub abort_sec: Option<i64>,
  #[serde(default)]
  pub abort_nsec: Option<u32>,
  #[serde(default)]
  pub trigger_count: Option<i64>,
  #[serde(default)]
  pub interrupt_count: Option<i64>,
}

#[derive(Debug)]
struct BoardEntry {
  snapshot: ChannelSnapshot,
  /// The next abort value is the one delivered on (re)connection.
  reconnecting: bool,
  /// An abort value has been received at least once.
  primed: bool,
}

impl Default for BoardEntry {
  /// Not yet connected: the first abort value reports current state, not a transition.
  fn default() -> Self {
    Self {
      snapshot: ChannelSnapshot::default(),
      reconnecting: true,
      primed: false,
    }
  }
}

/// In-process latest-value map for the configured channels.
///
/// Applying an abort value publishes `(channel, abort)` on the event queue,
/// except for the first value of each channel and the first after a disconnect.
#[derive(Debug)]
pub struct SnapshotBoard {
  entries: RwLock<HashMap<String, BoardEntry>>,
  events: EventSender,
}

impl SnapshotBoard {
  pub fn new<I, S>(channels: I, events: EventSender) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let entries = channels
      .into_iter()
      .map(|c| (c.into(), BoardEntry::default()))
      .collect();
    Self {
      entries: RwLock::new(entries),
      events,
    }
  }

  /// Apply an update. Returns whether an abort notification was queued.
  pub fn apply(&self, update: &ChannelUpdate) -> Result<bool, EngineError> {
    if let Some(nsec) = update.abort_nsec {
      if nsec >= 1_000_000_000 {
        return Err(EngineError::parse(format!(
          "{}: abort_nsec out of range: {}",
          update.channel, nsec
        )));
      }
    }

    if let Some(sec) = update.abort_sec {
      if !Timestamp::new(sec, 0).is_representable() {
        return Err(EngineError::parse(format!(
          "{}: abort_sec out of range: {}",
          update.channel, sec
        )));
      }
    }
    let captured_at = update.captured_at.unwrap_or_else(Timestamp::now);
    if !captured_at.is_representable() {
      return Err(EngineError::parse(format!(
        "{}: captured_at out of range: {}.{}",
        update.channel, captured_at.sec, captured_at.nsec
      )));
    }
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let entry = entries
      .get_mut(&update.channel)
      .ok_or_else(|| EngineError::UnknownChannel(update.channel.clone()))?;
    let snap = &mut entry.snapshot;

    if let Some(v) = update.abort_sec {
      snap.abort_sec = Sample { value: v, captured_at };
    }
    if let Some(v) = update.abort_nsec {
      snap.abort_nsec = Sample { value: v, captured_at };
    }
    if let Some(v) = update.trigger_count {
      snap.trigger_count = v;
    }
    if let Some(v) = update.interrupt_count {
      snap.interrupt_count = v;
    }

    let Some(abort) = update.abort else {
      return Ok(false);
    };
    snap.abort = Sample {
      value: abort,
      captured_at,
    };
    entry.primed = true;

    if entry.reconnecting {
      entry.reconnecting = false;
      debug!(channel = %update.channel, "connection update; not queued");
      return Ok(false);
    }

    debug!(channel = %update.channel, abort, "put abort event to queue");
    Ok(self.events.send(AbortEvent::new(update.channel.clone(), abort)))
  }

  /// Mark a channel as disconnected.
  pub fn disconnect(&self, channel: &str) -> Result<(), EngineError> {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let entry = entries
      .get_mut(channel)
      .ok_or_else(|| EngineError::UnknownChannel(channel.to_string()))?;
    entry.reconnecting = true;
    debug!(channel, "connection lost");
    Ok(())
  }
}

impl ChannelSnapshotSource for SnapshotBoard {
  fn snapshot(&self, channel: &str) -> Option<ChannelSnapshot> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries.get(channel).map(|e| e.snapshot)
  }

  fn is_ready(&self) -> bool {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries.values().all(|e| e.primed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue;

  const VALIDITY: Duration = Duration::from_secs(5);

  fn at(sec: i64) -> Option<Timestamp> {
    Some(Timestamp::new(sec, 0))
  }

  fn connected(channels: &[&str]) -> (SnapshotBoard, queue::EventQueue) {
    let (tx, q) = queue::channel();
    let board = SnapshotBoard::new(channels.iter().copied(), tx);
    for c in channels {
      board
        .apply(&ChannelUpdate {
          channel: (*c).into(),
          captured_at: at(0),
          abort: Some(false),
          ..Default::default()
        })
        .unwrap();
    }
    (board, q)
  }

  #[test]
  fn timestamp_valid_only_when_fields_caught_up() {
    let mut snap = ChannelSnapshot::default();
    snap.abort = Sample { value: true, captured_at: Timestamp::new(100, 0) };
    snap.abort_sec = Sample { value: 99, captured_at: Timestamp::new(90, 0) };
    snap.abort_nsec = Sample { value: 7, captured_at: Timestamp::new(100, 0) };
    assert_eq!(snap.abort_timestamp(VALIDITY), None);

    snap.abort_sec.captured_at = Timestamp::new(95, 1);
    assert_eq!(snap.abort_timestamp(VALIDITY), Some(Timestamp::new(99, 7)));

    // Exactly at the floor is still stale.
    snap.abort_nsec.captured_at = Timestamp::new(95, 0);
    assert_eq!(snap.abort_timestamp(VALIDITY), None);
  }

  #[test]
  fn abort_updates_are_queued() {
    let (board, mut q) = connected(&["A"]);

    let queued = board
      .apply(&ChannelUpdate {
        channel: "A".into(),
        captured_at: at(10),
        abort: Some(true),
        abort_sec: Some(9),
        abort_nsec: Some(5),
        trigger_count: Some(2),
        interrupt_count: Some(1),
      })
      .unwrap();
    assert!(queued);
    assert_eq!(q.drain_snapshot(), vec![AbortEvent::new("A", true)]);

    let snap = board.snapshot("A").unwrap();
    assert_eq!(snap.abort_timestamp(VALIDITY), Some(Timestamp::new(9, 5)));
    assert_eq!(snap.channel_timestamp(), Timestamp::new(10, 0));
    assert_eq!(snap.trigger_count, 2);
    assert_eq!(snap.interrupt_count, 1);
  }

  #[test]
  fn counter_only_updates_are_not_queued() {
    let (tx, mut q) = queue::channel();
    let board = SnapshotBoard::new(["A"], tx);
    let queued = board
      .apply(&ChannelUpdate {
        channel: "A".into(),
        trigger_count: Some(4),
        ..Default::default()
      })
      .unwrap();
    assert!(!queued);
    assert!(q.drain_snapshot().is_empty());
  }

  #[test]
  fn first_value_after_disconnect_is_not_queued() {
    let (board, mut q) = connected(&["A"]);
    board.disconnect("A").unwrap();

    let update = ChannelUpdate {
      channel: "A".into(),
      captured_at: at(1),
      abort: Some(true),
      ..Default::default()
    };
    assert!(!board.apply(&update).unwrap());
    assert!(board.snapshot("A").unwrap().abort.value);
    assert!(board.apply(&update).unwrap());
    assert_eq!(q.drain_snapshot().len(), 1);
  }

  #[test]
  fn initial_value_is_not_queued_and_marks_ready() {
    let (tx, mut q) = queue::channel();
    let board = SnapshotBoard::new(["A", "B"], tx);
    assert!(!board.is_ready());

    let asserted = ChannelUpdate {
      channel: "A".into(),
      captured_at: at(1),
      abort: Some(true),
      ..Default::default()
    };
    assert!(!board.apply(&asserted).unwrap());
    assert!(board.snapshot("A").unwrap().abort.value);
    assert!(!board.is_ready());

    // Counters alone do not count as the initial value.
    board
      .apply(&ChannelUpdate {
        channel: "B".into(),
        trigger_count: Some(3),
        ..Default::default()
      })
      .unwrap();
    assert!(!board.is_ready());

    board
      .apply(&ChannelUpdate {
        channel: "B".into(),
        abort: Some(false),
        ..Default::default()
      })
      .unwrap();
    assert!(board.is_ready());
    assert!(q.drain_snapshot().is_empty());

    assert!(board.apply(&asserted).unwrap());
    assert_eq!(q.drain_snapshot(), vec![AbortEvent::new("A", true)]);
  }

  #[test]
  fn unknown_channels_are_rejected() {
    let (tx, _q) = queue::channel();
    let board = SnapshotBoard::new(["A"], tx);
    let err = board
      .apply(&ChannelUpdate {
        channel: "B".into(),
        abort: Some(true),
        ..Default::default()
      })
      .unwrap_err();
    assert!(matches!(err, EngineError::UnknownChannel(c) if c == "B"));
    assert!(board.disconnect("B").is_err());
    assert!(board.snapshot("B").is_none());
  }

  #[test]
  fn out_of_range_nanoseconds_are_rejected() {
    let (tx, _q) = queue::channel();
    let board = SnapshotBoard::new(["A"], tx);
    let err = board
      .apply(&ChannelUpdate {
        channel: "A".into(),
        abort_nsec: Some(1_000_000_000),
        ..Default::default()
      })
      .unwrap_err();
    assert!(err.to_string().contains("abort_nsec"));
  }

  #[test]
  fn out_of_range_seconds_are_rejected() {
    let (board, mut q) = connected(&["A"]);
    let err = board
      .apply(&ChannelUpdate {
        channel: "A".into(),
        captured_at: at(10),
        abort: Some(true),
        abort_sec: Some(i64::MIN),
        abort_nsec: Some(0),
        ..Default::default()
      })
      .unwrap_err();
    assert!(err.to_string().contains("abort_sec"));

    let err = board
      .apply(&ChannelUpdate {
        channel: "A".into(),
        captured_at: Some(Timestamp::new(i64::MAX, 0)),
        abort: Some(true),
        ..Default::default()
      })
      .unwrap_err();
    assert!(err.to_string().contains("captured_at"));

    // Rejected updates leave the snapshot untouched.
    let snap = board.snapshot("A").unwrap();
    assert!(!snap.abort.value);
    assert_eq!(snap.abort_sec.value, 0);
    assert!(q.drain_snapshot().is_empty());
  }
}
