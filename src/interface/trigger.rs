use std::sync::Arc;

use cadenza_core::{Event, InterfaceId, MillisecondTime, ParameterIndex, ParameterInfo};

use super::{EventHandler, ParameterEventInterface, SyncInterface};
use crate::{Engine, Result};

/// A [`SyncInterface`] that dispatches every scheduled event right away, up to its
/// timestamp, instead of waiting for the next audio block.
pub struct TriggerInterface {
    inner: SyncInterface,
}

impl TriggerInterface {
    pub fn new(engine: &Arc<Engine>, handler: Box<dyn EventHandler>) -> Result<Self> {
        Ok(Self {
            inner: SyncInterface::new(engine, handler)?,
        })
    }
}

impl ParameterEventInterface for TriggerInterface {
    fn id(&self) -> InterfaceId {
        self.inner.id()
    }

    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn parameter_value(&self, index: ParameterIndex) -> f64 {
        self.inner.parameter_value(index)
    }

    fn set_parameter_value(
        &self,
        index: ParameterIndex,
        value: f64,
        time: MillisecondTime,
    ) -> Result<()> {
        self.schedule_event(Event::parameter(index, value, time).with_source(self.id()))
    }

    fn parameter_info(&self, index: ParameterIndex) -> Option<ParameterInfo> {
        self.inner.parameter_info(index)
    }

    fn parameter_id(&self, index: ParameterIndex) -> Option<String> {
        self.inner.parameter_id(index)
    }

    fn parameter_index_for_id(&self, id: &str) -> Option<ParameterIndex> {
        self.inner.parameter_index_for_id(id)
    }

    fn schedule_event(&self, event: Event) -> Result<()> {
        self.inner.engine().schedule_and_dispatch(event)
    }

    fn drain_events(&self) {}

    fn current_time(&self) -> MillisecondTime {
        self.inner.current_time()
    }
}
