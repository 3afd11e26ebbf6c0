use std::collections::HashMap;
use std::sync::Arc;

use cadenza_core::{
    Event, EventKind, EventQueue, InterfaceEndpoint, InterfaceId, MillisecondTime,
    ParameterEvent, ParameterIndex, ParameterInfo, ParameterTable, QueueMode,
};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use super::{EventHandler, ParameterEventInterface, ParameterShadow};
use crate::{Engine, Result};

#[derive(Clone, Copy)]
struct Slot {
    last_sent: MillisecondTime,
    pending: Option<(ParameterEvent, MillisecondTime)>,
}

impl Slot {
    fn send(&mut self, now: MillisecondTime, out: &SegQueue<Event>) {
        if let Some((event, time)) = self.pending.take() {
            out.push(Event::new(time, EventKind::Parameter(event)));
            self.last_sent = now;
        }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            last_sent: f64::NEG_INFINITY,
            pending: None,
        }
    }
}

/// Holds back parameter notifications so each parameter is reported at most once per period.
struct Coalescer {
    period: MillisecondTime,
    slots: Vec<Slot>,
}

impl Coalescer {
    fn new(period: MillisecondTime, len: usize) -> Self {
        Self {
            period,
            slots: vec![Slot::default(); len],
        }
    }

    fn reset(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, Slot::default());
    }

    /// Keep `event` as the pending notification of its parameter. `false` if the index has
    /// no slot.
    fn offer(&mut self, event: ParameterEvent, time: MillisecondTime) -> bool {
        match self.slots.get_mut(event.index) {
            Some(slot) => {
                slot.pending = Some((event, time));
                true
            }
            None => false,
        }
    }

    fn flush(&mut self, now: MillisecondTime, out: &SegQueue<Event>) {
        for slot in &mut self.slots {
            if now - slot.last_sent < self.period {
                continue;
            }
            slot.send(now, out);
        }
    }

    /// Emit every pending notification whether or not its period has elapsed.
    fn flush_all(&mut self, now: MillisecondTime, out: &SegQueue<Event>) {
        for slot in &mut self.slots {
            slot.send(now, out);
        }
    }
}

struct AsyncEndpoint {
    id: InterfaceId,
    shadow: ParameterShadow,
    incoming: EventQueue,
    outgoing: SegQueue<Event>,
    coalescer: Mutex<Coalescer>,
}

impl InterfaceEndpoint for AsyncEndpoint {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn drain_incoming(&self, sink: &mut dyn FnMut(Event)) {
        self.incoming.drain(sink);
    }

    fn push_outgoing(&self, event: &Event) {
        if let EventKind::Parameter(parameter) = event.kind() {
            self.shadow.set(parameter.index, parameter.value);
            if let Some(mut coalescer) = self.coalescer.try_lock() {
                if coalescer.offer(*parameter, event.time()) {
                    return;
                }
            }
        }
        self.outgoing.push(event.clone());
    }

    fn end_block(&self, now: MillisecondTime) {
        if let Some(mut coalescer) = self.coalescer.try_lock() {
            coalescer.flush(now, &self.outgoing);
        }
    }

    fn flush_outgoing(&self, now: MillisecondTime) {
        self.coalescer.lock().flush_all(now, &self.outgoing);
    }

    fn patcher_changed(&self, table: &Arc<ParameterTable>, value: &dyn Fn(ParameterIndex) -> f64) {
        self.shadow.reset(table, value);
        let mut coalescer = self.coalescer.lock();
        // Held-back notifications of the old patch are still delivered.
        coalescer.flush_all(f64::NEG_INFINITY, &self.outgoing);
        coalescer.reset(table.len());
    }
}

/// Queue-based interface. Setters never wait for the audio thread; outgoing events are
/// buffered until [`drain_events`](ParameterEventInterface::drain_events) is called.
pub struct AsyncInterface {
    engine: Arc<Engine>,
    endpoint: Arc<AsyncEndpoint>,
    handler: Mutex<Box<dyn EventHandler>>,
    /// Last value this interface set per parameter, to hide our own echoes.
    last_set: Mutex<HashMap<ParameterIndex, f64>>,
}

impl AsyncInterface {
    /// Async interface using the engine's configured queue mode.
    pub fn new(engine: &Arc<Engine>, handler: Box<dyn EventHandler>) -> Result<Self> {
        Self::with_mode(engine, engine.config().queue_mode, handler)
    }

    pub fn with_mode(
        engine: &Arc<Engine>,
        mode: QueueMode,
        handler: Box<dyn EventHandler>,
    ) -> Result<Self> {
        let config = engine.config();
        let table = engine.parameter_table();
        let endpoint = Arc::new(AsyncEndpoint {
            id: engine.next_interface_id(),
            coalescer: Mutex::new(Coalescer::new(config.notification_period_ms, table.len())),
            shadow: ParameterShadow::new(table),
            incoming: EventQueue::new(mode, config.queue_capacity),
            outgoing: SegQueue::new(),
        });
        engine.register_endpoint(endpoint.clone())?;
        Ok(Self {
            engine: Arc::clone(engine),
            endpoint,
            handler: Mutex::new(handler),
            last_set: Mutex::new(HashMap::new()),
        })
    }

    pub fn queue_mode(&self) -> QueueMode {
        self.endpoint.incoming.mode()
    }

    fn is_own_echo(&self, last_set: &HashMap<ParameterIndex, f64>, event: &Event) -> bool {
        match event.kind() {
            EventKind::Parameter(parameter) if parameter.source == Some(self.endpoint.id) => {
                last_set
                    .get(&parameter.index)
                    .is_some_and(|v| v.to_bits() == parameter.value.to_bits())
            }
            _ => false,
        }
    }
}

impl ParameterEventInterface for AsyncInterface {
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
        self.last_set.lock().insert(index, value);
        self.endpoint.shadow.set(index, value);
        self.endpoint
            .incoming
            .push(Event::parameter(index, value, time).with_source(self.endpoint.id));
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
        self.endpoint.incoming.push(event);
        Ok(())
    }

    /// The handler may call back into this interface, except for `drain_events` itself.
    fn drain_events(&self) {
        let mut batch: Vec<Event> = std::iter::from_fn(|| self.endpoint.outgoing.pop()).collect();
        if batch.is_empty() {
            return;
        }
        {
            let last_set = self.last_set.lock();
            batch.retain(|event| !self.is_own_echo(&last_set, event));
        }
        let mut handler = self.handler.lock();
        for event in &batch {
            handler.handle_event(event);
        }
    }

    fn current_time(&self) -> MillisecondTime {
        self.engine.current_time()
    }
}

impl Drop for AsyncInterface {
    fn drop(&mut self) {
        self.engine.deregister_endpoint(self.endpoint.id);
    }
}
