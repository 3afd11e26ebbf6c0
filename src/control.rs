//! The engine's own endpoint: events scheduled through [`Engine`](crate::Engine) and a
//! mirror of the attached patch's parameter values.
//!
//! Neither side touches the swap gate, so control threads can schedule and read as often
//! as they like without the audio thread skipping a block.

use std::sync::Arc;

use cadenza_core::{
    Event, EventQueue, InterfaceEndpoint, InterfaceId, ParameterIndex, ParameterTable, QueueMode,
};

use crate::interface::ParameterShadow;

/// Id of the control endpoint. Interface ids handed out by the engine start at 1.
pub(crate) const CONTROL_ENDPOINT: InterfaceId = InterfaceId::new(0);

pub(crate) struct ControlEndpoint {
    incoming: EventQueue,
    shadow: ParameterShadow,
}

impl ControlEndpoint {
    pub(crate) fn new(table: Arc<ParameterTable>) -> Self {
        Self {
            incoming: EventQueue::new(QueueMode::MultiProducer, 0),
            shadow: ParameterShadow::new(table),
        }
    }

    /// Queue an event for the next dispatch. Callable from any thread.
    pub(crate) fn push(&self, event: Event) {
        self.incoming.push(event);
    }

    /// Last value the patch reported for `index`.
    pub(crate) fn parameter_value(&self, index: ParameterIndex) -> f64 {
        self.shadow.value(index)
    }
}

impl InterfaceEndpoint for ControlEndpoint {
    fn id(&self) -> InterfaceId {
        CONTROL_ENDPOINT
    }

    fn drain_incoming(&self, sink: &mut dyn FnMut(Event)) {
        self.incoming.drain(sink);
    }

    fn push_outgoing(&self, event: &Event) {
        self.shadow.observe(event);
    }

    fn patcher_changed(&self, table: &Arc<ParameterTable>, value: &dyn Fn(ParameterIndex) -> f64) {
        self.shadow.reset(table, value);
    }
}
