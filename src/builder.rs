//! Builder for configuring and constructing an `Engine`.

use std::sync::Arc;
use std::time::Duration;

use cadenza_core::{Patcher, QueueMode};

use crate::config::EngineConfig;
use crate::{Engine, Result};

/// The engine is prepared during `build` when a sample rate is given; otherwise call
/// [`Engine::prepare_to_process`] before the first block.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cadenza::{Engine, NullPatcher};
///
/// let engine = Engine::builder()
///     .sample_rate(44100.0)
///     .max_block_size(256)
///     .lock_timeout(Duration::from_secs(2))
///     .patcher(Box::new(NullPatcher))
///     .build()?;
///
/// assert_eq!(engine.sample_rate(), 44100.0);
/// # Ok::<(), cadenza::Error>(())
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    sample_rate: Option<f64>,
    max_block_size: usize,
    patcher: Option<Box<dyn Patcher>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            sample_rate: None,
            max_block_size: 512,
            patcher: None,
        }
    }
}

impl EngineBuilder {
    /// Replace the whole configuration. Later setters still apply on top.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 10 s
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Default: 15 ms
    pub fn notification_period_ms(mut self, period: f64) -> Self {
        self.config.notification_period_ms = period;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Default: [`QueueMode::MultiProducer`]
    pub fn queue_mode(mut self, mode: QueueMode) -> Self {
        self.config.queue_mode = mode;
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Default: 512
    pub fn max_block_size(mut self, frames: usize) -> Self {
        self.max_block_size = frames;
        self
    }

    pub fn patcher(mut self, patcher: Box<dyn Patcher>) -> Self {
        self.patcher = Some(patcher);
        self
    }

    pub fn build(self) -> Result<Arc<Engine>> {
        let engine = Engine::new(self.config)?;
        if let Some(sample_rate) = self.sample_rate {
            engine.prepare_to_process(sample_rate, self.max_block_size)?;
        }
        if let Some(patcher) = self.patcher {
            engine.set_patcher(patcher)?;
        }
        Ok(Arc::new(engine))
    }
}
