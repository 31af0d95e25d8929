//! JSON-lines feed of live channel values and reset pulses.
//!
//! Each line is one tagged object:
//! - `{"kind":"channel","channel":"...","abort":true,"abort_sec":..,"abort_nsec":..,...}`
//! - `{"kind":"reset","value":1}`
//! - `{"kind":"disconnect","channel":"..."}`
//!
//! Blank lines are skipped; bad lines are logged and skipped.

use serde::Deserialize;
use std::io::BufRead;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::reset::ResetCounter;
use crate::snapshot::{ChannelUpdate, SnapshotBoard};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedLine {
  Channel(ChannelUpdate),
  Reset { value: i64 },
  Disconnect { channel: String },
}

/// Effect of one feed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
  Blank,
  /// Snapshot updated and an abort notification queued.
  Queued,
  /// Snapshot or connection state updated, nothing queued.
  Updated,
  Reset { accepted: bool },
}

/// Counters for one feed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
  pub lines: u64,
  pub queued: u64,
  pub resets: u64,
  pub rejected: u64,
}

pub fn apply(line: &FeedLine, board: &SnapshotBoard, resets: &ResetCounter) -> Result<Applied, EngineError> {
  match line {
    FeedLine::Channel(update) => Ok(if board.apply(update)? {
      Applied::Queued
    } else {
      Applied::Updated
    }),
    FeedLine::Reset { value } => Ok(Applied::Reset {
      accepted: resets.pulse(*value),
    }),
    FeedLine::Disconnect { channel } => {
      board.disconnect(channel)?;
      Ok(Applied::Updated)
    }
  }
}

/// Parse and apply one raw line.
pub fn apply_raw(raw: &str, board: &SnapshotBoard, resets: &ResetCounter) -> Result<Applied, EngineError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(Applied::Blank);
  }
  let line: FeedLine = serde_json::from_str(trimmed)?;
  apply(&line, board, resets)
}

/// Read the feed until EOF. Blocks; run it on its own thread.
pub fn run<R: BufRead>(reader: R, board: &SnapshotBoard, resets: &ResetCounter) -> Result<FeedStats, EngineError> {
  let mut stats = FeedStats::default();
  for raw in reader.lines() {
    let raw = raw?;
    stats.lines += 1;
    match apply_raw(&raw, board, resets) {
      Ok(Applied::Queued) => stats.queued += 1,
      Ok(Applied::Reset { accepted: true }) => stats.resets += 1,
      Ok(_) => {}
      Err(e) => {
        stats.rejected += 1;
        warn!(line = stats.lines, error = %e, "feed line rejected");
      }
    }
  }
  info!(
    lines = stats.lines,
    queued = stats.queued,
    resets = stats.resets,
    rejected = stats.rejected,
    "feed closed"
  );
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue;
  use crate::snapshot::ChannelSnapshotSource;
  use crate::types::{AbortEvent, Timestamp};

  #[test]
  fn parses_tagged_lines() {
    let line: FeedLine = serde_json::from_str(
      r#"{"kind":"channel","channel":"H1","captured_at":{"sec":5,"nsec":1},"abort":true,"abort_sec":4,"abort_nsec":2}"#,
    )
    .unwrap();
    match line {
      FeedLine::Channel(u) => {
        assert_eq!(u.channel, "H1");
        assert_eq!(u.captured_at, Some(Timestamp::new(5, 1)));
        assert_eq!(u.abort, Some(true));
        assert_eq!(u.trigger_count, None);
      }
      other => panic!("unexpected line: {:?}", other),
    }

    let reset: FeedLine = serde_json::from_str(r#"{"kind":"reset","value":1}"#).unwrap();
    assert!(matches!(reset, FeedLine::Reset { value: 1 }));
  }

  #[test]
  fn run_applies_lines_and_counts_rejects() {
    let (tx, mut q) = queue::channel();
    let board = SnapshotBoard::new(["H1"], tx);
    let resets = ResetCounter::new();
    let input = concat!(
      "{\"kind\":\"channel\",\"channel\":\"H1\",\"trigger_count\":3}\n",
      "{\"kind\":\"channel\",\"channel\":\"H1\",\"abort\":false}\n",
      "\n",
      "{\"kind\":\"channel\",\"channel\":\"H1\",\"abort\":true}\n",
      "{\"kind\":\"reset\",\"value\":1}\n",
      "{\"kind\":\"reset\",\"value\":7}\n",
      "not json\n",
      "{\"kind\":\"channel\",\"channel\":\"NOPE\",\"abort\":true}\n",
    );

    let stats = run(input.as_bytes(), &board, &resets).unwrap();
    assert_eq!(
      stats,
      FeedStats {
        lines: 8,
        queued: 1,
        resets: 1,
        rejected: 2,
      }
    );
    assert_eq!(resets.current(), 1);
    assert_eq!(board.snapshot("H1").unwrap().trigger_count, 3);
    assert_eq!(q.drain_snapshot(), vec![AbortEvent::new("H1", true)]);
  }

  #[test]
  fn disconnect_suppresses_next_transition() {
    let (tx, mut q) = queue::channel();
    let board = SnapshotBoard::new(["H1"], tx);
    let resets = ResetCounter::new();
    let set = r#"{"kind":"channel","channel":"H1","abort":true}"#;
    let unset = r#"{"kind":"channel","channel":"H1","abort":false}"#;
    assert_eq!(apply_raw(unset, &board, &resets).unwrap(), Applied::Updated);
    assert_eq!(apply_raw(set, &board, &resets).unwrap(), Applied::Queued);
    assert_eq!(
      apply_raw(r#"{"kind":"disconnect","channel":"H1"}"#, &board, &resets).unwrap(),
      Applied::Updated
    );
    assert_eq!(apply_raw(unset, &board, &resets).unwrap(), Applied::Updated);
    assert_eq!(apply_raw(set, &board, &resets).unwrap(), Applied::Queued);
    assert_eq!(
      q.drain_snapshot(),
      vec![AbortEvent::new("H1", true), AbortEvent::new("H1", true)]
    );
  }
}
