//! Multi-producer / single-consumer queue of abort-flag notifications.
//!
//! Producers never block. The consumer drains only the depth observed at the
//! start of a tick, so anything enqueued while the tick runs (including
//! retries) waits for the next one.

use tokio::sync::mpsc;

use crate::types::AbortEvent;

/// Create a connected sender/queue pair.
pub fn channel() -> (EventSender, EventQueue) {
  let (tx, rx) = mpsc::unbounded_channel();
  let sender = EventSender { tx: tx.clone() };
  let queue = EventQueue { rx, retry: tx };
  (sender, queue)
}

/// Producer side; cheap to clone, one per notification source.
#[derive(Debug, Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<AbortEvent>,
}

impl EventSender {
  /// Enqueue a notification. Returns false once the consumer is gone.
  pub fn send(&self, event: AbortEvent) -> bool {
    self.tx.send(event).is_ok()
  }
}

/// Consumer side, owned by the engine.
#[derive(Debug)]
pub struct EventQueue {
  rx: mpsc::UnboundedReceiver<AbortEvent>,
  retry: mpsc::UnboundedSender<AbortEvent>,
}

impl EventQueue {
  /// Dequeue exactly the events present right now, in arrival order.
  pub fn drain_snapshot(&mut self) -> Vec<AbortEvent> {
    let depth = self.rx.len();
    let mut events = Vec::with_capacity(depth);
    for _ in 0..depth {
      match self.rx.try_recv() {
        Ok(event) => events.push(event),
        Err(_) => break,
      }
    }
    events
  }

  /// Put an event back at the tail for a later tick.
  pub fn requeue(&self, event: AbortEvent) {
    // The queue owns the receiver, so the channel is open for as long as `self` lives.
    let _ = self.retry.send(event);
  }
}
