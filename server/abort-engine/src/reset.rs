//! Process-wide count of reset pulses since the last full quiescence.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Shared reset counter. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct ResetCounter {
  count: Arc<AtomicI64>,
}

impl ResetCounter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a value change of the reset signal. Only 0 and 1 are meaningful;
  /// anything else is ignored and reported as `false`.
  pub fn pulse(&self, value: i64) -> bool {
    if !(0..=1).contains(&value) {
      debug!(value, "reset value out of range; ignored");
      return false;
    }
    let count = self.count.fetch_add(value, Ordering::AcqRel) + value;
    debug!(count, "reset counter incremented");
    true
  }

  pub fn current(&self) -> i64 {
    self.count.load(Ordering::Acquire)
  }

  pub fn clear(&self) {
    self.count.store(0, Ordering::Release);
  }
}
