use std::sync::Arc;

use cadenza_core::{
    Event, InterfaceEndpoint, InterfaceId, MillisecondTime, ParameterIndex, ParameterInfo,
    ParameterTable,
};
use parking_lot::Mutex;

use super::{EventHandler, ParameterEventInterface, ParameterShadow};
use crate::{Engine, Result};

/// Endpoint that hands every outgoing event to the handler immediately.
pub(crate) struct HandlerEndpoint {
    id: InterfaceId,
    shadow: ParameterShadow,
    // Calls are serialized by the engine's swap gate, so the lock is never contended.
    handler: Mutex<Box<dyn EventHandler>>,
}

impl HandlerEndpoint {
    pub(crate) fn new(engine: &Engine, id: InterfaceId, handler: Box<dyn EventHandler>) -> Self {
        Self {
            id,
            shadow: ParameterShadow::new(engine.parameter_table()),
            handler: Mutex::new(handler),
        }
    }
}

impl InterfaceEndpoint for HandlerEndpoint {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn push_outgoing(&self, event: &Event) {
        self.shadow.observe(event);
        self.handler.lock().handle_event(event);
    }

    fn patcher_changed(&self, table: &Arc<ParameterTable>, value: &dyn Fn(ParameterIndex) -> f64) {
        self.shadow.reset(table, value);
    }
}

/// Schedules directly into the engine; the handler runs wherever events occur, usually on
/// the audio thread.
pub struct SyncInterface {
    engine: Arc<Engine>,
    endpoint: Arc<HandlerEndpoint>,
}

impl SyncInterface {
    pub fn new(engine: &Arc<Engine>, handler: Box<dyn EventHandler>) -> Result<Self> {
        let id = engine.next_interface_id();
        let endpoint = Arc::new(HandlerEndpoint::new(engine, id, handler));
        engine.register_endpoint(endpoint.clone())?;
        Ok(Self {
            engine: Arc::clone(engine),
            endpoint,
        })
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

impl ParameterEventInterface for SyncInterface {
    fn id(&self) -> InterfaceId {
        self.endpoint.id
    }

    fn num_parameters(&self) -> usize {
        self.endpoint.shadow.len()
    }

    fn parameter_value(&self, index: ParameterIndex) -> f64 {
        self.endpoint.shadow.value(index)
    }

    fn set_parameter_value(
        &self,
        index: ParameterIndex,
        value: f64,
        time: MillisecondTime,
    ) -> Result<()> {
        self.engine
            .schedule_event(Event::parameter(index, value, time).with_source(self.id()));
        Ok(())
    }

    fn parameter_info(&self, index: ParameterIndex) -> Option<ParameterInfo> {
        self.endpoint.shadow.info(index)
    }

    fn parameter_id(&self, index: ParameterIndex) -> Option<String> {
        self.endpoint.shadow.id(index)
    }

    fn parameter_index_for_id(&self, id: &str) -> Option<ParameterIndex> {
        self.endpoint.shadow.index_of(id)
    }

    fn schedule_event(&self, event: Event) -> Result<()> {
        self.engine.schedule_event(event);
        Ok(())
    }

    fn drain_events(&self) {}

    fn current_time(&self) -> MillisecondTime {
        self.engine.current_time()
    }
}

impl Drop for SyncInterface {
    fn drop(&mut self) {
        self.engine.deregister_endpoint(self.endpoint.id);
    }
}
