//! Channel list: which channels are monitored, their ring and message.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::types::{ChannelRecord, Ring};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
  pub id: String,
  pub ring: Ring,
  pub message: String,
}

/// Validated channel list. Every channel id appears exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelList {
  entries: Vec<ChannelEntry>,
}

impl ChannelList {
  pub fn from_entries(entries: Vec<ChannelEntry>) -> Result<Self, EngineError> {
    let mut seen = HashSet::new();
    for entry in &entries {
      if entry.id.is_empty() {
        return Err(EngineError::config("channel id must not be empty"));
      }
      if !seen.insert(entry.id.as_str()) {
        return Err(EngineError::DuplicateChannel(entry.id.clone()));
      }
    }
    Ok(Self { entries })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ChannelEntry> {
    self.entries.iter()
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.id.as_str())
  }

  /// Fresh engine-side records, all de-asserted.
  pub fn records(&self) -> HashMap<String, ChannelRecord> {
    self
      .entries
      .iter()
      .map(|e| {
        (
          e.id.clone(),
          ChannelRecord {
            id: e.id.clone(),
            ring: e.ring,
            message: e.message.clone(),
            last_abort: false,
          },
        )
      })
      .collect()
  }
}

/// Parse one ring's flat list: `name[, message]` per line, blank lines skipped.
pub fn parse_list(ring: Ring, text: &str) -> Vec<ChannelEntry> {
  text
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(|line| {
      let (id, message) = match line.split_once(',') {
        Some((id, rest)) => (id, rest.split(',').next().unwrap_or("")),
        None => (line, ""),
      };
      ChannelEntry {
        id: id.trim().to_string(),
        ring,
        message: message.trim().to_string(),
      }
    })
    .collect()
}

pub fn load_list_file(ring: Ring, path: &Path) -> Result<Vec<ChannelEntry>, EngineError> {
  let text = fs::read_to_string(path)?;
  Ok(parse_list(ring, &text))
}

/// Load both rings' list files into one validated list.
pub fn load_ring_lists(her: &Path, ler: &Path) -> Result<ChannelList, EngineError> {
  let mut entries = load_list_file(Ring::Her, her)?;
  entries.extend(load_list_file(Ring::Ler, ler)?);
  ChannelList::from_entries(entries)
}
