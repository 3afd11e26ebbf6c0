//! Engine-facing half of a parameter interface.

use std::sync::Arc;

use crate::event::{Event, InterfaceId, MillisecondTime, ParameterIndex};
use crate::parameter::ParameterTable;

/// Called by the engine on the audio thread. Implementations must not block.
pub trait InterfaceEndpoint: Send + Sync {
    fn id(&self) -> InterfaceId;

    /// Hand every queued incoming event to `sink`.
    fn drain_incoming(&self, _sink: &mut dyn FnMut(Event)) {}

    /// Observe one outgoing event.
    fn push_outgoing(&self, event: &Event);

    /// Called once after each processed block with the block end time.
    fn end_block(&self, _now: MillisecondTime) {}

    /// Release everything held back. Called after events were dispatched outside a block,
    /// where no `end_block` follows.
    fn flush_outgoing(&self, _now: MillisecondTime) {}

    /// A new patch was attached. `value` reads its current parameter values.
    fn patcher_changed(&self, table: &Arc<ParameterTable>, value: &dyn Fn(ParameterIndex) -> f64);
}

/// Registration changes delivered to the engine through its service queue.
pub enum ServiceNotification {
    Registered(Arc<dyn InterfaceEndpoint>),
    Deregistered(InterfaceId),
}

impl std::fmt::Debug for ServiceNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceNotification::Registered(endpoint) => {
                f.debug_tuple("Registered").field(&endpoint.id()).finish()
            }
            ServiceNotification::Deregistered(id) => f.debug_tuple("Deregistered").field(id).finish(),
        }
    }
}
