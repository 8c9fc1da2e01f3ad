//! Configuration types.

use std::time::Duration;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of the inbound event queue feeding the dispatcher.
    pub event_queue_capacity: usize,
    /// How often the edit-sync cache sweeps out expired entries.
    pub sweep_interval: Duration,
    /// Long-poll timeout for the platform update feed.
    pub poll_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 256,
            sweep_interval: Duration::from_secs(60), // 1 minute
            poll_timeout: Duration::from_secs(30),
        }
    }
}
