//! Engine configuration.

use std::time::Duration;

use cadenza_core::{QueueMode, DEFAULT_EVENT_CAPACITY, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest a control thread waits for the audio thread before giving up on an operation.
    pub lock_timeout: Duration,
    /// Minimum spacing of outgoing parameter notifications per parameter (async interfaces).
    pub notification_period_ms: f64,
    /// Ring capacity of single-producer interface queues.
    pub queue_capacity: usize,
    /// Queue topology of async interfaces.
    pub queue_mode: QueueMode,
    /// Capacity of the interface registration queue.
    pub service_queue_capacity: usize,
    /// Initial capacity of each event sequence.
    pub event_capacity: usize,
    pub max_interfaces: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            notification_period_ms: 15.0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_mode: QueueMode::MultiProducer,
            service_queue_capacity: 64,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_interfaces: 32,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(Error::InvalidConfig("lock_timeout must be non-zero".into()));
        }
        if !(self.notification_period_ms.is_finite() && self.notification_period_ms >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "notification_period_ms {} must be finite and non-negative",
                self.notification_period_ms
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity must be non-zero".into()));
        }
        if self.service_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "service_queue_capacity must be non-zero".into(),
            ));
        }
        if self.max_interfaces == 0 {
            return Err(Error::InvalidConfig("max_interfaces must be non-zero".into()));
        }
        Ok(())
    }
}
