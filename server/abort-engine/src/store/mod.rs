//! Incident persistence: the narrow interface the engine writes through,
//! an in-memory implementation and the Postgres one.

mod pg;

pub use pg::{PgStore, SignalFilter, SignalRow};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;
use crate::types::{Incident, IncidentId, SignalId, SignalRecord, Timestamp};

#[async_trait]
pub trait IncidentStore: Send + Sync {
  /// Create an incident at `time` and return its id.
  async fn insert_incident(&self, time: Timestamp) -> Result<IncidentId, StoreError>;

  async fn update_incident_time(&self, id: IncidentId, time: Timestamp) -> Result<(), StoreError>;

  /// Insert signal records, linking them to `incident` when given.
  async fn insert_signal_records(
    &self,
    records: &[SignalRecord],
    incident: Option<IncidentId>,
  ) -> Result<Vec<SignalId>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSignal {
  pub id: SignalId,
  pub incident_id: Option<IncidentId>,
  pub record: SignalRecord,
}

#[derive(Debug, Default)]
struct MemoryState {
  incidents: BTreeMap<IncidentId, Timestamp>,
  signals: Vec<StoredSignal>,
  next_incident: i64,
  next_signal: i64,
}

/// Store kept entirely in memory, with the same uniqueness rule on incident
/// time as the database.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state: Mutex<MemoryState>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn incidents(&self) -> Vec<Incident> {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    state
      .incidents
      .iter()
      .map(|(&id, &time)| Incident { id, time })
      .collect()
  }

  pub fn incident(&self, id: IncidentId) -> Option<Incident> {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.incidents.get(&id).map(|&time| Incident { id, time })
  }

  /// All signals in insertion order.
  pub fn signals(&self) -> Vec<StoredSignal> {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.signals.clone()
  }
}

#[async_trait]
impl IncidentStore for MemoryStore {
  async fn insert_incident(&self, time: Timestamp) -> Result<IncidentId, StoreError> {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.incidents.values().any(|&t| t == time) {
      return Err(StoreError::DuplicateIncidentTime(time));
    }
    state.next_incident += 1;
    let id = IncidentId(state.next_incident);
    state.incidents.insert(id, time);
    Ok(id)
  }

  async fn update_incident_time(&self, id: IncidentId, time: Timestamp) -> Result<(), StoreError> {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.incidents.iter().any(|(&other, &t)| other != id && t == time) {
      return Err(StoreError::DuplicateIncidentTime(time));
    }
    match state.incidents.get_mut(&id) {
      Some(t) => {
        *t = time;
        Ok(())
      }
      None => Err(StoreError::UnknownIncident(id)),
    }
  }

  async fn insert_signal_records(
    &self,
    records: &[SignalRecord],
    incident: Option<IncidentId>,
  ) -> Result<Vec<SignalId>, StoreError> {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(id) = incident {
      if !state.incidents.contains_key(&id) {
        return Err(StoreError::UnknownIncident(id));
      }
    }
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
      state.next_signal += 1;
      let id = SignalId(state.next_signal);
      state.signals.push(StoredSignal {
        id,
        incident_id: incident,
        record: record.clone(),
      });
      ids.push(id);
    }
    Ok(ids)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn signal(channel: &str) -> SignalRecord {
    SignalRecord {
      incident_id: None,
      channel: channel.into(),
      message: String::new(),
      channel_ts: Timestamp::new(1, 0),
      abort_ts: Timestamp::new(1, 0),
      reset_count: 0,
      trigger_count: 0,
      interrupt_count: 0,
    }
  }

  #[tokio::test]
  async fn incident_times_are_unique() {
    let store = MemoryStore::new();
    let a = store.insert_incident(Timestamp::new(10, 0)).await.unwrap();
    let b = store.insert_incident(Timestamp::new(20, 0)).await.unwrap();
    assert_ne!(a, b);

    let err = store.insert_incident(Timestamp::new(10, 0)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIncidentTime(_)));
    let err = store.update_incident_time(b, Timestamp::new(10, 0)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIncidentTime(_)));

    store.update_incident_time(b, Timestamp::new(15, 0)).await.unwrap();
    assert_eq!(store.incident(b).unwrap().time, Timestamp::new(15, 0));
  }

  #[tokio::test]
  async fn signals_link_to_known_incidents_only() {
    let store = MemoryStore::new();
    let err = store
      .insert_signal_records(&[signal("A")], Some(IncidentId(9)))
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::UnknownIncident(IncidentId(9))));

    let id = store.insert_incident(Timestamp::new(1, 0)).await.unwrap();
    let ids = store
      .insert_signal_records(&[signal("A"), signal("B")], Some(id))
      .await
      .unwrap();
    assert_eq!(ids.len(), 2);
    store.insert_signal_records(&[signal("C")], None).await.unwrap();

    let signals = store.signals();
    assert_eq!(signals.len(), 3);
    assert_eq!(signals[0].incident_id, Some(id));
    assert_eq!(signals[2].incident_id, None);
    assert_eq!(signals[2].record.channel, "C");
  }
}
