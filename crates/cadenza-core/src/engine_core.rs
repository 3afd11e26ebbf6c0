//! Single-threaded engine: owns the patch and the event sequences and runs the
//! per-block dispatch loop.
//!
//! `EngineCore` is not synchronized. The `cadenza` crate wraps it in an `Engine`
//! that gates access between the audio thread and control threads.

use std::sync::Arc;

use crate::context::EngineContext;
use crate::dataref::AllocationOutcome;
use crate::endpoint::InterfaceEndpoint;
use crate::error::{Error, Result};
use crate::event::{
    ClockId, Event, EventKind, EventTarget, InterfaceId, MillisecondTime, ParameterEvent,
    ParameterIndex, PresetCallback, PresetEvent, PresetEventKind, StartupPhase, TimedMidiEvent,
};
use crate::parameter::ParameterTable;
use crate::patcher::{NullPatcher, Patcher};
use crate::scheduler::Scheduler;
use crate::state::Preset;
use crate::warn_once;

/// Default capacity of each event sequence.
pub const DEFAULT_EVENT_CAPACITY: usize = 512;

pub struct EngineCore {
    patcher: Box<dyn Patcher>,
    target: EventTarget,
    next_generation: u32,
    scheduler: Scheduler,
    outgoing: Vec<Event>,
    endpoints: Vec<Arc<dyn InterfaceEndpoint>>,
    parameters: Arc<ParameterTable>,
    /// Parameter values before a preset is applied, to notify only what changed.
    parameter_scratch: Vec<f64>,
    sample_rate: f64,
    max_block_size: usize,
    prepared: bool,
    setting_preset: bool,
    touched_this_block: bool,
    in_process: bool,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EngineCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with `NullPatcher` attached and sequences sized for `event_capacity` events.
    pub fn with_capacity(event_capacity: usize) -> Self {
        Self {
            patcher: Box::new(NullPatcher),
            target: EventTarget::root(0),
            next_generation: 1,
            scheduler: Scheduler::with_capacity(event_capacity),
            outgoing: Vec::with_capacity(event_capacity),
            endpoints: Vec::new(),
            parameters: Arc::new(ParameterTable::default()),
            parameter_scratch: Vec::new(),
            sample_rate: 0.0,
            max_block_size: 0,
            prepared: false,
            setting_preset: false,
            touched_this_block: false,
            in_process: false,
        }
    }

    fn parts(&mut self) -> (&mut dyn Patcher, EngineContext<'_>) {
        let ctx = EngineContext::new(
            &mut self.scheduler,
            &mut self.outgoing,
            self.target,
            self.sample_rate,
            self.setting_preset,
        );
        (self.patcher.as_mut(), ctx)
    }

    #[inline]
    pub fn current_time(&self) -> MillisecondTime {
        self.scheduler.now()
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Target of the attached patch.
    #[inline]
    pub fn target(&self) -> EventTarget {
        self.target
    }

    pub fn parameter_table(&self) -> &Arc<ParameterTable> {
        &self.parameters
    }

    pub fn patcher(&self) -> &dyn Patcher {
        self.patcher.as_ref()
    }

    pub fn patcher_mut(&mut self) -> &mut dyn Patcher {
        self.patcher.as_mut()
    }

    /// Configure for a sample rate and maximum block size.
    pub fn prepare_to_process(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(Error::InvalidBlockSize(max_block_size));
        }
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.prepared = true;
        self.scheduler.set_min_interval(1000.0 / sample_rate);
        self.patcher.prepare_to_process(sample_rate, max_block_size);
        self.commit_data_refs();
        tracing::debug!(
            "Prepared engine: {} Hz, {} frames max",
            sample_rate,
            max_block_size
        );
        Ok(())
    }

    /// Schedule an event. Stale timestamps are moved to the current time.
    pub fn schedule_event(&mut self, event: Event) {
        schedule_checked(&mut self.scheduler, self.target, event);
    }

    /// Process one block of audio.
    ///
    /// `midi_in` offsets are relative to the block start; outgoing MIDI is appended to
    /// `midi_out` with offsets inside `0..frames`.
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        midi_in: Option<&[TimedMidiEvent]>,
        midi_out: Option<&mut Vec<TimedMidiEvent>>,
    ) {
        debug_assert!(!self.in_process, "EngineCore::process re-entered");
        if !self.prepared {
            warn_once!("process called before prepare_to_process; outputting silence");
            for channel in outputs.iter_mut() {
                let n = frames.min(channel.len());
                channel[..n].fill(0.0);
            }
            return;
        }
        self.in_process = true;

        let start = self.scheduler.now();
        let end = start + frames as f64 * 1000.0 / self.sample_rate;

        // Collect incoming events from every interface
        self.collect_incoming();
        if let Some(midi_in) = midi_in {
            for midi in midi_in {
                let time = start + midi.frame_offset as f64 * 1000.0 / self.sample_rate;
                self.scheduler.schedule(Event::midi(midi.event, time));
            }
        }

        // Dispatch everything due inside [start, end)
        self.scheduler.begin_block(end);
        while let Some(event) = self.scheduler.next_due() {
            self.dispatch(event);
        }
        self.scheduler.finish_dispatch();

        // Render audio; anything the patch schedules now lands at or after the block end
        self.commit_data_refs();
        self.scheduler.set_context_time(end);
        {
            let (patcher, mut ctx) = self.parts();
            patcher.process(inputs, outputs, frames, &mut ctx);
        }

        self.deliver_outgoing(midi_out, start, frames);
        for endpoint in &self.endpoints {
            endpoint.end_block(end);
        }

        self.clear_touched();
        self.touched_this_block = false;
        self.scheduler.advance(end);
        self.in_process = false;
    }

    /// Schedule every event queued by the registered interfaces.
    pub fn collect_incoming(&mut self) {
        let scheduler = &mut self.scheduler;
        let target = self.target;
        for endpoint in &self.endpoints {
            endpoint.drain_incoming(&mut |event| schedule_checked(scheduler, target, event));
        }
    }

    /// Dispatch every pending event with a timestamp `<= time` without rendering audio.
    ///
    /// The block clock is not advanced, but nothing scheduled afterwards is dispatched
    /// earlier than the latest event dispatched here.
    pub fn process_events_until(&mut self, time: MillisecondTime) {
        debug_assert!(!self.in_process, "process_events_until called during process");
        self.collect_incoming();
        self.scheduler.begin_until(time);
        while let Some(event) = self.scheduler.next_due() {
            self.dispatch(event);
        }
        self.scheduler.finish_dispatch();
        self.deliver_outgoing(None, self.scheduler.now(), 0);
        self.flush_endpoints();
    }

    fn dispatch(&mut self, event: Event) {
        let time = event.time();
        let target = event.target();
        match event.into_kind() {
            EventKind::Parameter(parameter) => self.apply_parameter(parameter, time),
            EventKind::Midi(midi) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_midi_event(&midi, &mut ctx);
            }
            EventKind::Message(message) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_message(&message, &mut ctx);
            }
            EventKind::Clock(clock) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_clock_event(target, &clock, &mut ctx);
            }
            EventKind::OutletValue(outlet) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_outlet_event(&outlet, &mut ctx);
            }
            EventKind::DataRefUpdated(index) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_data_ref_event(index, &mut ctx);
            }
            EventKind::Transport(state) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_transport(state, &mut ctx);
                self.outgoing.push(Event::transport(state, time));
            }
            EventKind::Tempo(bpm) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_tempo(bpm, &mut ctx);
                self.outgoing.push(Event::tempo(bpm, time));
            }
            EventKind::BeatTime(beats) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_beat_time(beats, &mut ctx);
                self.outgoing.push(Event::beat_time(beats, time));
            }
            EventKind::TimeSignature(signature) => {
                let (patcher, mut ctx) = self.parts();
                patcher.process_time_signature(signature, &mut ctx);
                self.outgoing.push(Event::time_signature(
                    signature.numerator,
                    signature.denominator,
                    time,
                ));
            }
            EventKind::Preset(preset) => self.dispatch_preset(preset, time),
            EventKind::Startup(phase) => {
                self.setting_preset = phase == StartupPhase::Begin;
                self.outgoing.push(Event::startup(phase, time));
            }
        }
    }

    fn apply_parameter(&mut self, parameter: ParameterEvent, time: MillisecondTime) {
        let ParameterEvent {
            index,
            value,
            source,
        } = parameter;
        if index >= self.patcher.num_parameters() {
            warn_once!("Parameter index {} out of range", index);
            return;
        }
        let value = {
            let (patcher, mut ctx) = self.parts();
            patcher.set_parameter_value(index, value, &mut ctx);
            patcher.parameter_value(index)
        };
        let mut notification = Event::parameter(index, value, time);
        if let Some(source) = source {
            notification = notification.with_source(source);
        }
        self.outgoing.push(notification);

        let saveable = self.parameters.info(index).map_or(true, |info| info.saveable);
        if saveable && !self.setting_preset && !self.touched_this_block {
            self.touched_this_block = true;
            self.outgoing
                .push(Event::preset_notification(PresetEventKind::Touched, time));
        }
    }

    fn dispatch_preset(&mut self, event: PresetEvent, time: MillisecondTime) {
        match event.kind {
            PresetEventKind::Get => {
                let preset = Arc::new(self.get_preset_sync());
                if let Some(callback) = event.callback {
                    callback(preset);
                }
            }
            PresetEventKind::Set => {
                if let Some(preset) = event.preset {
                    self.apply_preset(&preset, time);
                    if let Some(callback) = event.callback {
                        callback(preset);
                    }
                }
            }
            kind => self.outgoing.push(Event::preset_notification(kind, time)),
        }
    }

    fn apply_preset(&mut self, preset: &Preset, time: MillisecondTime) {
        let count = self.patcher.num_parameters();
        self.parameter_scratch.clear();
        self.parameter_scratch
            .extend((0..count).map(|i| self.patcher.parameter_value(i)));

        self.setting_preset = true;
        self.outgoing
            .push(Event::preset_notification(PresetEventKind::SettingBegin, time));
        {
            let (patcher, mut ctx) = self.parts();
            patcher.set_preset(preset, &mut ctx);
        }
        self.setting_preset = false;

        for index in 0..count.min(self.parameter_scratch.len()) {
            let value = self.patcher.parameter_value(index);
            if value.to_bits() != self.parameter_scratch[index].to_bits() {
                self.outgoing.push(Event::parameter(index, value, time));
            }
        }
        self.outgoing
            .push(Event::preset_notification(PresetEventKind::SettingEnd, time));
    }

    /// Snapshot the patch state.
    pub fn get_preset_sync(&self) -> Preset {
        let mut preset = Preset::new();
        self.patcher.get_preset(&mut preset);
        preset
    }

    /// Apply a preset immediately.
    pub fn set_preset_sync(&mut self, preset: &Preset) {
        let time = self.scheduler.earliest_time();
        self.apply_preset(preset, time);
        self.deliver_outgoing(None, self.scheduler.now(), 0);
        self.flush_endpoints();
    }

    /// Snapshot the patch state at the current time; `callback` runs where the event is dispatched.
    pub fn get_preset(&mut self, callback: PresetCallback) {
        let time = self.scheduler.context_time();
        self.scheduler.schedule(Event::preset_get(callback, time));
    }

    /// Apply `preset` at the current time; `callback` runs after it was applied.
    pub fn set_preset(&mut self, preset: Arc<Preset>, callback: Option<PresetCallback>) {
        let time = self.scheduler.context_time();
        self.scheduler.schedule(Event::preset_set(preset, callback, time));
    }

    /// Replace the patch. Returns the detached one so it can be dropped off the audio thread.
    pub fn set_patcher(&mut self, patcher: Box<dyn Patcher>) -> Box<dyn Patcher> {
        let erased = self.scheduler.erase_generation(self.target.generation());

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);
        self.target = EventTarget::root(generation);
        let previous = std::mem::replace(&mut self.patcher, patcher);

        let now = self.scheduler.context_time();
        self.scheduler
            .schedule(Event::startup(StartupPhase::Begin, now));
        {
            let (patcher, mut ctx) = self.parts();
            patcher.initialize(&mut ctx);
        }
        if self.prepared {
            self.patcher
                .prepare_to_process(self.sample_rate, self.max_block_size);
        }
        self.commit_data_refs();
        self.scheduler.schedule(Event::startup(StartupPhase::End, now));

        self.parameters = Arc::new(ParameterTable::from_patcher(self.patcher.as_ref()));
        self.parameter_scratch = Vec::with_capacity(self.parameters.len());
        let patcher = self.patcher.as_ref();
        for endpoint in &self.endpoints {
            endpoint.patcher_changed(&self.parameters, &|i| patcher.parameter_value(i));
        }
        tracing::debug!(
            "Attached patch generation {} ({} parameters, {} stale events erased)",
            generation,
            self.parameters.len(),
            erased
        );
        previous
    }

    /// Remove pending callbacks of a clock; with `execute` they fire next instead.
    pub fn flush_clock_events(
        &mut self,
        target: Option<EventTarget>,
        clock_id: ClockId,
        execute: bool,
    ) -> usize {
        self.scheduler.flush_clock_events(target, clock_id, execute)
    }

    /// Current value of a parameter, `0.0` if the index is out of range.
    pub fn parameter_value(&self, index: ParameterIndex) -> f64 {
        if index >= self.patcher.num_parameters() {
            warn_once!("Parameter index {} out of range", index);
            return 0.0;
        }
        self.patcher.parameter_value(index)
    }

    pub fn register_endpoint(&mut self, endpoint: Arc<dyn InterfaceEndpoint>) {
        let patcher = self.patcher.as_ref();
        endpoint.patcher_changed(&self.parameters, &|i| patcher.parameter_value(i));
        tracing::debug!("Registered interface {:?}", endpoint.id());
        self.endpoints.push(endpoint);
    }

    pub fn deregister_endpoint(&mut self, id: InterfaceId) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| e.id() != id);
        let removed = self.endpoints.len() != before;
        if removed {
            tracing::debug!("Deregistered interface {:?}", id);
        }
        removed
    }

    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// Pending events: due ones first, then future ones.
    pub fn pending_events(&self) -> impl Iterator<Item = &Event> {
        self.scheduler.pending()
    }

    fn commit_data_refs(&mut self) {
        for index in 0..self.patcher.num_data_refs() {
            if let Some(data_ref) = self.patcher.data_ref_mut(index) {
                if data_ref.allocate_if_needed() == AllocationOutcome::Failed {
                    warn_once!(
                        "DataRef '{}' could not be resized to {:?} bytes",
                        data_ref.name(),
                        data_ref.requested_size_in_bytes()
                    );
                }
            }
        }
    }

    fn clear_touched(&mut self) {
        for index in 0..self.patcher.num_data_refs() {
            if let Some(data_ref) = self.patcher.data_ref_mut(index) {
                data_ref.set_touched(false);
            }
        }
    }

    fn flush_endpoints(&self) {
        let time = self.scheduler.earliest_time();
        for endpoint in &self.endpoints {
            endpoint.flush_outgoing(time);
        }
    }

    /// Route outgoing MIDI to `midi_out` and show every outgoing event to the endpoints.
    fn deliver_outgoing(
        &mut self,
        mut midi_out: Option<&mut Vec<TimedMidiEvent>>,
        block_start: MillisecondTime,
        frames: usize,
    ) {
        let samples_per_ms = self.sample_rate / 1000.0;
        for event in self.outgoing.drain(..) {
            if let (EventKind::Midi(midi), Some(out)) = (event.kind(), midi_out.as_deref_mut()) {
                let offset = ((event.time() - block_start) * samples_per_ms).round();
                let offset = if offset.is_finite() && offset > 0.0 {
                    (offset as usize).min(frames.saturating_sub(1))
                } else {
                    0
                };
                out.push(TimedMidiEvent::new(offset, *midi));
            }
            for endpoint in &self.endpoints {
                endpoint.push_outgoing(&event);
            }
        }
    }
}

/// Queued events may still address a patch that was replaced since; those are dropped.
fn schedule_checked(scheduler: &mut Scheduler, attached: EventTarget, event: Event) {
    if let Some(target) = event.target() {
        if target.generation() != attached.generation() {
            tracing::debug!(
                "Dropped event for patch generation {} ({} is attached)",
                target.generation(),
                attached.generation()
            );
            return;
        }
    }
    scheduler.schedule(event);
}
