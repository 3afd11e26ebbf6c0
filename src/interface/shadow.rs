//! Per-interface copy of the parameter table and the last known parameter values.

use std::sync::Arc;

use arc_swap::ArcSwap;
use cadenza_core::{
    warn_once, Event, EventKind, ParameterIndex, ParameterInfo, ParameterTable, ShadowValues,
};

/// Readable from any thread without touching the engine.
pub(crate) struct ParameterShadow {
    table: ArcSwap<ParameterTable>,
    values: ArcSwap<ShadowValues>,
}

impl ParameterShadow {
    pub(crate) fn new(table: Arc<ParameterTable>) -> Self {
        let values = ShadowValues::new(table.initial_values());
        Self {
            table: ArcSwap::new(table),
            values: ArcSwap::from_pointee(values),
        }
    }

    /// Adopt a new patch's table and read its current values.
    pub(crate) fn reset(&self, table: &Arc<ParameterTable>, value: &dyn Fn(ParameterIndex) -> f64) {
        self.values
            .store(Arc::new(ShadowValues::new((0..table.len()).map(value))));
        self.table.store(Arc::clone(table));
    }

    /// Track parameter notifications; other events are ignored.
    pub(crate) fn observe(&self, event: &Event) {
        if let EventKind::Parameter(parameter) = event.kind() {
            self.values.load().set(parameter.index, parameter.value);
        }
    }

    pub(crate) fn set(&self, index: ParameterIndex, value: f64) {
        self.values.load().set(index, value);
    }

    pub(crate) fn len(&self) -> usize {
        self.values.load().len()
    }

    pub(crate) fn value(&self, index: ParameterIndex) -> f64 {
        match self.values.load().get(index) {
            Some(value) => value,
            None => {
                warn_once!("Parameter index {} out of range", index);
                0.0
            }
        }
    }

    pub(crate) fn info(&self, index: ParameterIndex) -> Option<ParameterInfo> {
        self.table.load().info(index).cloned()
    }

    pub(crate) fn id(&self, index: ParameterIndex) -> Option<String> {
        self.table.load().id(index).map(str::to_string)
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<ParameterIndex> {
        self.table.load().index_of(id)
    }
}
