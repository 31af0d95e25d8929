//! Engine configuration with sane defaults.

use std::time::Duration;

/// Tunables for the correlation loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Sleep between ticks.
  pub tick_interval: Duration,
  /// Two rings whose first aborts are less than this many whole seconds apart share one incident.
  pub both_ring_window_secs: i64,
  /// A channel's abort timestamp is trusted only if its fields were captured
  /// no earlier than this long before the abort flag itself.
  pub timestamp_validity: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      tick_interval: Duration::from_millis(100),
      both_ring_window_secs: 5,
      timestamp_validity: Duration::from_secs(5),
    }
  }
}
