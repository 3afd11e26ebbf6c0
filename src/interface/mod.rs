//! Parameter and event interfaces for non-audio threads.
//!
//! Three flavours share one contract:
//!
//! - [`SyncInterface`]: events go straight into the engine under the control permit,
//!   outgoing events reach the handler as they occur
//! - [`TriggerInterface`]: like sync, but each scheduled event is dispatched immediately
//! - [`AsyncInterface`]: events travel through lock-free queues; outgoing parameter
//!   notifications are coalesced and delivered by [`ParameterEventInterface::drain_events`]
//!
//! Every interface keeps shadow copies of the parameter values so reads never reach the
//! audio thread. Dropping an interface deregisters it from the engine.

mod async_interface;
mod handler;
mod shadow;
mod sync;
mod trigger;

pub use async_interface::AsyncInterface;
pub use handler::{EventHandler, NullHandler};
pub use sync::SyncInterface;
pub use trigger::TriggerInterface;

pub(crate) use shadow::ParameterShadow;

use cadenza_core::{
    warn_once, Event, InterfaceId, MessagePayload, MessageTag, MidiEvent, MillisecondTime,
    ParameterIndex, ParameterInfo, QueueMode,
};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Which interface [`Engine::create_parameter_interface`](crate::Engine::create_parameter_interface)
/// builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Sync,
    Trigger,
    Async(QueueMode),
}

impl Default for InterfaceKind {
    fn default() -> Self {
        InterfaceKind::Async(QueueMode::default())
    }
}

/// Thread-safe access to a patch's parameters and event inputs.
pub trait ParameterEventInterface: Send + Sync {
    fn id(&self) -> InterfaceId;

    fn num_parameters(&self) -> usize;

    /// Last known value; `0.0` with a one-time warning for unknown indices.
    fn parameter_value(&self, index: ParameterIndex) -> f64;

    fn set_parameter_value(
        &self,
        index: ParameterIndex,
        value: f64,
        time: MillisecondTime,
    ) -> Result<()>;

    /// Set a parameter from a `0..=1` position, mapped through its range and curve.
    fn set_parameter_value_normalized(
        &self,
        index: ParameterIndex,
        normalized: f64,
        time: MillisecondTime,
    ) -> Result<()> {
        match self.parameter_info(index) {
            Some(info) => self.set_parameter_value(index, info.denormalize(normalized), time),
            None => {
                warn_once!("Parameter index {} out of range", index);
                Ok(())
            }
        }
    }

    fn parameter_info(&self, index: ParameterIndex) -> Option<ParameterInfo>;

    fn parameter_id(&self, index: ParameterIndex) -> Option<String>;

    fn parameter_index_for_id(&self, id: &str) -> Option<ParameterIndex>;

    fn schedule_event(&self, event: Event) -> Result<()>;

    fn send_message(
        &self,
        tag: MessageTag,
        payload: MessagePayload,
        time: MillisecondTime,
    ) -> Result<()> {
        self.schedule_event(Event::message(tag, payload, time))
    }

    fn send_midi(&self, port: u32, bytes: &[u8], time: MillisecondTime) -> Result<()> {
        self.schedule_event(Event::midi(MidiEvent::new(port, bytes), time))
    }

    /// Deliver queued outgoing events to the handler. No-op for interfaces that deliver
    /// as events occur.
    fn drain_events(&self);

    fn current_time(&self) -> MillisecondTime;
}
