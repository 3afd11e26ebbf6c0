//! The patch's view of the engine during a callback.

use crate::event::{
    ClockId, Event, EventTarget, MessagePayload, MessageTag, MidiEvent, MillisecondTime,
    ParameterIndex, PresetEventKind,
};
use crate::scheduler::Scheduler;

/// Passed to every [`Patcher`](crate::Patcher) entry point that may schedule or emit events.
pub struct EngineContext<'a> {
    scheduler: &'a mut Scheduler,
    outgoing: &'a mut Vec<Event>,
    target: EventTarget,
    sample_rate: f64,
    setting_preset: bool,
}

impl<'a> EngineContext<'a> {
    pub(crate) fn new(
        scheduler: &'a mut Scheduler,
        outgoing: &'a mut Vec<Event>,
        target: EventTarget,
        sample_rate: f64,
        setting_preset: bool,
    ) -> Self {
        Self {
            scheduler,
            outgoing,
            target,
            sample_rate,
            setting_preset,
        }
    }

    /// Block start between blocks, the dispatching event's time during dispatch,
    /// the block end while the block function runs.
    #[inline]
    pub fn current_time(&self) -> MillisecondTime {
        self.scheduler.context_time()
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Target of the attached patch.
    #[inline]
    pub fn target(&self) -> EventTarget {
        self.target
    }

    /// Whether a preset is being applied.
    #[inline]
    pub fn setting_preset(&self) -> bool {
        self.setting_preset
    }

    /// Convert a duration in samples to milliseconds.
    #[inline]
    pub fn samples_to_ms(&self, samples: f64) -> MillisecondTime {
        if self.sample_rate > 0.0 {
            samples * 1000.0 / self.sample_rate
        } else {
            0.0
        }
    }

    pub fn schedule_event(&mut self, event: Event) {
        if let Some(target) = event.target() {
            if target.generation() != self.target.generation() {
                debug_assert!(
                    false,
                    "event targets patch generation {} but {} is attached",
                    target.generation(),
                    self.target.generation()
                );
                return;
            }
        }
        self.scheduler.schedule(event);
    }

    /// Arm clock `clock_id` of the patch root at `time`.
    pub fn schedule_clock(&mut self, clock_id: ClockId, value: Option<f64>, time: MillisecondTime) {
        let event = Event::clock(self.target, clock_id, value, time);
        self.scheduler.schedule(event);
    }

    /// Remove pending callbacks of a clock; with `execute` they fire next instead.
    pub fn flush_clock_events(&mut self, target: EventTarget, clock_id: ClockId, execute: bool) -> usize {
        self.scheduler.flush_clock_events(Some(target), clock_id, execute)
    }

    pub fn notify_parameter_value_changed(&mut self, index: ParameterIndex, value: f64) {
        let time = self.current_time();
        self.outgoing.push(Event::parameter(index, value, time));
    }

    pub fn send_outlet(&mut self, index: usize, value: f64) {
        let time = self.current_time();
        self.outgoing.push(Event::outlet(index, value, time));
    }

    /// Emit MIDI at the current time.
    pub fn send_midi(&mut self, event: MidiEvent) {
        let time = self.current_time();
        self.outgoing.push(Event::midi(event, time));
    }

    /// Emit MIDI at a sample offset from the start of the running block.
    pub fn send_midi_at(&mut self, frame_offset: usize, event: MidiEvent) {
        let time = self.scheduler.now() + self.samples_to_ms(frame_offset as f64);
        self.outgoing.push(Event::midi(event, time));
    }

    pub fn send_message(&mut self, tag: MessageTag, payload: MessagePayload) {
        let time = self.current_time();
        self.outgoing.push(Event::message(tag, payload, time));
    }

    /// Report that saveable state changed. Ignored while a preset is being applied.
    pub fn preset_touched(&mut self) {
        if self.setting_preset {
            return;
        }
        let time = self.current_time();
        self.outgoing
            .push(Event::preset_notification(PresetEventKind::Touched, time));
    }
}
