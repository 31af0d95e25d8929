//! Core engine: drains abort notifications, maintains per-ring sessions,
//! creates/merges/corrects incidents and emits signal records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::channels::ChannelList;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::queue::EventQueue;
use crate::reset::ResetCounter;
use crate::session::{AbortSession, RingSessions};
use crate::snapshot::ChannelSnapshotSource;
use crate::store::IncidentStore;
use crate::types::*;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
  pub drained: usize,
  pub signals: usize,
  pub retried: usize,
  pub failed: usize,
}

enum Outcome {
  Deasserted,
  Retried,
  Signal,
}

/// The abort correlation engine. Owns the channel cache and both ring sessions.
pub struct Engine {
  config: EngineConfig,
  channels: HashMap<String, ChannelRecord>,
  sessions: RingSessions,
  queue: EventQueue,
  resets: ResetCounter,
  source: Arc<dyn ChannelSnapshotSource>,
  store: Arc<dyn IncidentStore>,
  stop: Arc<AtomicBool>,
  done: Arc<watch::Sender<bool>>,
}

impl Engine {
  pub fn new(
    config: EngineConfig,
    channels: &ChannelList,
    queue: EventQueue,
    resets: ResetCounter,
    source: Arc<dyn ChannelSnapshotSource>,
    store: Arc<dyn IncidentStore>,
  ) -> Self {
    let (done, _) = watch::channel(false);
    Self {
      config,
      channels: channels.records(),
      sessions: RingSessions::default(),
      queue,
      resets,
      source,
      store,
      stop: Arc::new(AtomicBool::new(false)),
      done: Arc::new(done),
    }
  }

  pub fn handle(&self) -> EngineHandle {
    EngineHandle {
      stop: self.stop.clone(),
      done: self.done.subscribe(),
    }
  }

  pub fn session(&self, ring: Ring) -> &AbortSession {
    self.sessions.get(ring)
  }

  pub fn channel(&self, id: &str) -> Option<&ChannelRecord> {
    self.channels.get(id)
  }

  /// Read every channel's abort flag once and mark rings that are already
  /// aborting, so they cannot create or merge incidents until they quiesce.
  pub fn reconcile_startup(&mut self) -> Result<(), EngineError> {
    let mut active = [false; 2];
    for record in self.channels.values_mut() {
      let snapshot = self
        .source
        .snapshot(&record.id)
        .ok_or_else(|| EngineError::UnknownChannel(record.id.clone()))?;
      record.last_abort = snapshot.abort.value;
      if record.last_abort {
        active[record.ring.index()] = true;
      }
    }

    for ring in Ring::ALL {
      let session = self.sessions.get_mut(ring);
      session.clear();
      session.was_already_active = active[ring.index()];
      if session.was_already_active {
        info!(ring = %ring, "abort already active at startup; incidents held until the ring quiesces");
      }
    }
    Ok(())
  }

  /// Process every event queued at the start of the tick, then the ring status pass.
  pub async fn tick(&mut self) -> TickReport {
    let events = self.queue.drain_snapshot();
    let mut report = TickReport {
      drained: events.len(),
      ..TickReport::default()
    };
    if events.is_empty() {
      return report;
    }
    debug!(queued = events.len(), "draining abort events");

    for event in events {
      let channel = event.channel.clone();
      match self.process_event(event).await {
        Ok(Outcome::Deasserted) => {}
        Ok(Outcome::Retried) => report.retried += 1,
        Ok(Outcome::Signal) => report.signals += 1,
        Err(e) => {
          report.failed += 1;
          error!(channel = %channel, error = %e, "abort event dropped");
        }
      }
    }

    self.update_ring_status();
    report
  }

  async fn process_event(&mut self, event: AbortEvent) -> Result<Outcome, EngineError> {
    let record = self
      .channels
      .get_mut(&event.channel)
      .ok_or_else(|| EngineError::UnknownChannel(event.channel.clone()))?;
    record.last_abort = event.abort;
    let ring = record.ring;
    let message = record.message.clone();
    debug!(channel = %event.channel, abort = event.abort, ring = %ring, "update abort status");

    if !event.abort {
      return Ok(Outcome::Deasserted);
    }

    let snapshot = self
      .source
      .snapshot(&event.channel)
      .ok_or_else(|| EngineError::UnknownChannel(event.channel.clone()))?;
    let Some(abort_ts) = snapshot.abort_timestamp(self.config.timestamp_validity) else {
      debug!(channel = %event.channel, "abort timestamp not updated yet; retry next tick");
      self.queue.requeue(event);
      return Ok(Outcome::Retried);
    };

    let incident_id = self.reconcile(ring, abort_ts).await?;

    let session = self.sessions.get(ring);
    let signal = SignalRecord {
      incident_id,
      channel: event.channel,
      message,
      channel_ts: snapshot.channel_timestamp(),
      abort_ts,
      reset_count: self.resets.current() - session.reset_offset,
      trigger_count: snapshot.trigger_count,
      interrupt_count: snapshot.interrupt_count,
    };
    debug!(channel = %signal.channel, incident_id = ?incident_id, "insert abort signal");
    self
      .store
      .insert_signal_records(std::slice::from_ref(&signal), incident_id)
      .await?;
    Ok(Outcome::Signal)
  }

  /// Attach `ring`'s session to an incident for an abort at `abort_ts`:
  /// merge with the other ring, create a new incident, or move the current
  /// one earlier. Returns the incident the signal belongs to.
  async fn reconcile(&mut self, ring: Ring, abort_ts: Timestamp) -> Result<Option<IncidentId>, EngineError> {
    let session = self.sessions.get(ring);
    if session.was_already_active {
      return Ok(None);
    }
    if let Some(id) = session.incident_id {
      self.correct_if_earlier(ring, abort_ts).await?;
      return Ok(Some(id));
    }

    let other = self.sessions.get(ring.opposite()).clone();
    if other.within_window(abort_ts, self.config.both_ring_window_secs) {
      debug!(ring = %ring, incident_id = ?other.incident_id, "both ring abort");
      self.sessions.get_mut(ring).adopt(&other);
      self.correct_if_earlier(ring, abort_ts).await?;
      return Ok(other.incident_id);
    }

    debug!(ring = %ring, abort_ts = %abort_ts, "single ring abort");
    let id = self.store.insert_incident(abort_ts).await?;
    let offset = self.resets.current();
    self.sessions.get_mut(ring).attach(id, abort_ts, offset);
    Ok(Some(id))
  }

  /// Earlier wins: move the incident (and every session on it) to `abort_ts`
  /// if that precedes the recorded start. Never moves it later.
  async fn correct_if_earlier(&mut self, ring: Ring, abort_ts: Timestamp) -> Result<(), EngineError> {
    let session = self.sessions.get(ring);
    let (Some(id), Some(start)) = (session.incident_id, session.start) else {
      return Ok(());
    };
    if abort_ts >= start {
      return Ok(());
    }
    debug!(incident_id = %id, from = %start, to = %abort_ts, "new faster abort");
    self.store.update_incident_time(id, abort_ts).await?;
    self.sessions.restart_incident(id, abort_ts);
    Ok(())
  }

  /// Clear the session of every quiescent ring, and the reset counter once
  /// no channel at all is asserted.
  pub fn update_ring_status(&mut self) {
    let mut total = 0;
    for ring in Ring::ALL {
      let asserted = self
        .channels
        .values()
        .filter(|c| c.ring == ring && c.last_abort)
        .count();
      total += asserted;
      if asserted == 0 {
        self.sessions.get_mut(ring).clear();
        debug!(ring = %ring, "clear abort session");
      }
    }
    if total == 0 {
      self.resets.clear();
      debug!("clear reset counter");
    }
  }

  /// Poll until the source has every channel's initial value. Returns `false`
  /// if a stop was requested first.
  async fn wait_for_source(&self) -> bool {
    let mut logged = false;
    while !self.source.is_ready() {
      if self.stop.load(Ordering::Acquire) {
        return false;
      }
      if !logged {
        info!("waiting for initial channel values");
        logged = true;
      }
      tokio::time::sleep(self.config.tick_interval).await;
    }
    true
  }

  /// Wait for initial channel values, reconcile startup state, then tick
  /// until stopped.
  ///
  /// Completion is signalled on every exit path, including errors and panics.
  pub async fn run(&mut self) -> Result<(), EngineError> {
    let _completion = Completion::begin(self.stop.clone(), self.done.clone());
    if !self.wait_for_source().await {
      return Ok(());
    }
    self.reconcile_startup()?;
    info!(
      channels = self.channels.len(),
      interval_ms = self.config.tick_interval.as_millis() as u64,
      "abort engine running"
    );

    while !self.stop.load(Ordering::Acquire) {
      self.tick().await;
      tokio::time::sleep(self.config.tick_interval).await;
    }
    Ok(())
  }
}

/// Marks the run finished when dropped.
struct Completion {
  stop: Arc<AtomicBool>,
  done: Arc<watch::Sender<bool>>,
}

impl Completion {
  fn begin(stop: Arc<AtomicBool>, done: Arc<watch::Sender<bool>>) -> Self {
    done.send_replace(false);
    Self { stop, done }
  }
}

impl Drop for Completion {
  fn drop(&mut self) {
    info!("abort engine stopped");
    self.stop.store(false, Ordering::Release);
    self.done.send_replace(true);
  }
}

/// Stop control for a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
  stop: Arc<AtomicBool>,
  done: watch::Receiver<bool>,
}

impl EngineHandle {
  /// Ask the loop to stop at the next tick boundary.
  pub fn request_stop(&self) {
    self.stop.store(true, Ordering::Release);
  }

  /// Request a stop and wait until the loop has finished.
  pub async fn stop(&mut self) {
    self.request_stop();
    let _ = self.done.wait_for(|done| *done).await;
  }

  pub fn is_finished(&self) -> bool {
    *self.done.borrow()
  }
}
