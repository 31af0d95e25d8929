//! Per-ring abort session state.

use crate::types::{IncidentId, Ring, Timestamp};

/// In-progress correlation state of one ring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortSession {
  pub incident_id: Option<IncidentId>,
  /// Earliest reconciled abort instant of the attached incident.
  pub start: Option<Timestamp>,
  /// Reset counter value when the session attached to its incident.
  pub reset_offset: i64,
  /// The ring was already aborting when monitoring started.
  pub was_already_active: bool,
}

impl AbortSession {
  pub fn clear(&mut self) {
    *self = Self::default();
  }

  /// Attach to a freshly created incident.
  pub fn attach(&mut self, incident_id: IncidentId, start: Timestamp, reset_offset: i64) {
    self.incident_id = Some(incident_id);
    self.start = Some(start);
    self.reset_offset = reset_offset;
  }

  /// Share the other ring's incident verbatim.
  pub fn adopt(&mut self, other: &AbortSession) {
    self.incident_id = other.incident_id;
    self.start = other.start;
    self.reset_offset = other.reset_offset;
  }

  /// Whether an abort at `abort_ts` belongs to this session's incident
  /// under the cross-ring window (whole seconds, exclusive).
  pub fn within_window(&self, abort_ts: Timestamp, window_secs: i64) -> bool {
    match (self.incident_id, self.start) {
      (Some(_), Some(start)) => abort_ts.sec.abs_diff(start.sec) < window_secs.max(0) as u64,
      _ => false,
    }
  }
}

/// The two rings' sessions.
#[derive(Debug, Clone, Default)]
pub struct RingSessions {
  sessions: [AbortSession; 2],
}

impl RingSessions {
  pub fn get(&self, ring: Ring) -> &AbortSession {
    &self.sessions[ring.index()]
  }

  pub fn get_mut(&mut self, ring: Ring) -> &mut AbortSession {
    &mut self.sessions[ring.index()]
  }

  /// Move the start of every session attached to `incident_id`.
  pub fn restart_incident(&mut self, incident_id: IncidentId, start: Timestamp) {
    for session in self.sessions.iter_mut() {
      if session.incident_id == Some(incident_id) {
        session.start = Some(start);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clear_resets_every_field() {
    let mut s = AbortSession {
      incident_id: Some(IncidentId(3)),
      start: Some(Timestamp::new(10, 0)),
      reset_offset: 2,
      was_already_active: true,
    };
    s.clear();
    assert_eq!(s, AbortSession::default());
  }

  #[test]
  fn window_uses_whole_seconds_and_is_exclusive() {
    let mut s = AbortSession::default();
    assert!(!s.within_window(Timestamp::new(100, 0), 5));

    s.attach(IncidentId(1), Timestamp::new(100, 900_000_000), 0);
    assert!(s.within_window(Timestamp::new(104, 999_999_999), 5));
    assert!(s.within_window(Timestamp::new(96, 0), 5));
    assert!(!s.within_window(Timestamp::new(105, 0), 5));
    assert!(!s.within_window(Timestamp::new(95, 0), 5));
  }

  #[test]
  fn window_check_handles_extreme_seconds() {
    let mut s = AbortSession::default();
    s.attach(IncidentId(1), Timestamp::new(1_700_000_000, 0), 0);
    assert!(!s.within_window(Timestamp::new(i64::MIN, 0), 5));
    assert!(!s.within_window(Timestamp::new(i64::MAX, 0), 5));
    assert!(!s.within_window(Timestamp::new(1_700_000_000, 0), -1));
  }

  #[test]
  fn restart_moves_only_sessions_on_that_incident() {
    let mut sessions = RingSessions::default();
    sessions.get_mut(Ring::Her).attach(IncidentId(1), Timestamp::new(50, 0), 0);
    let her = sessions.get(Ring::Her).clone();
    sessions.get_mut(Ring::Ler).adopt(&her);

    sessions.restart_incident(IncidentId(1), Timestamp::new(48, 0));
    assert_eq!(sessions.get(Ring::Her).start, Some(Timestamp::new(48, 0)));
    assert_eq!(sessions.get(Ring::Ler).start, Some(Timestamp::new(48, 0)));

    sessions.get_mut(Ring::Ler).attach(IncidentId(2), Timestamp::new(70, 0), 1);
    sessions.restart_incident(IncidentId(1), Timestamp::new(47, 0));
    assert_eq!(sessions.get(Ring::Ler).start, Some(Timestamp::new(70, 0)));
  }
}
