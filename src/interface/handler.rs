//! Host-side receiver for outgoing engine events.

use cadenza_core::{
    Event, EventKind, MessageEvent, MidiEvent, MillisecondTime, OutletEvent, ParameterEvent,
    PresetEvent, StartupPhase, TimeSignature, TransportState,
};

/// Receives the events a patch emits. Every method defaults to a no-op.
///
/// Sync and trigger interfaces call the handler where the event occurs, which may be the
/// audio thread. Async interfaces call it from [`drain_events`], on the thread owning the
/// interface.
///
/// [`drain_events`]: crate::ParameterEventInterface::drain_events
pub trait EventHandler: Send {
    /// Entry point for every delivered event. Override to see events before they are
    /// split by kind.
    fn handle_event(&mut self, event: &Event) {
        let time = event.time();
        match event.kind() {
            EventKind::Parameter(parameter) => self.handle_parameter_event(parameter, time),
            EventKind::Midi(midi) => self.handle_midi_event(midi, time),
            EventKind::Message(message) => self.handle_message_event(message, time),
            EventKind::Preset(preset) => self.handle_preset_event(preset, time),
            EventKind::Transport(state) => self.handle_transport_event(*state, time),
            EventKind::Tempo(bpm) => self.handle_tempo_event(*bpm, time),
            EventKind::BeatTime(beats) => self.handle_beat_time_event(*beats, time),
            EventKind::TimeSignature(signature) => {
                self.handle_time_signature_event(*signature, time)
            }
            EventKind::Startup(phase) => self.handle_startup_event(*phase, time),
            EventKind::OutletValue(outlet) => self.handle_outlet_event(outlet, time),
            // Engine-internal; never emitted.
            EventKind::Clock(_) | EventKind::DataRefUpdated(_) => {}
        }
    }

    fn handle_parameter_event(&mut self, _event: &ParameterEvent, _time: MillisecondTime) {}

    fn handle_midi_event(&mut self, _event: &MidiEvent, _time: MillisecondTime) {}

    fn handle_message_event(&mut self, _event: &MessageEvent, _time: MillisecondTime) {}

    fn handle_preset_event(&mut self, _event: &PresetEvent, _time: MillisecondTime) {}

    fn handle_transport_event(&mut self, _state: TransportState, _time: MillisecondTime) {}

    fn handle_tempo_event(&mut self, _bpm: f64, _time: MillisecondTime) {}

    fn handle_beat_time_event(&mut self, _beats: f64, _time: MillisecondTime) {}

    fn handle_time_signature_event(&mut self, _signature: TimeSignature, _time: MillisecondTime) {
    }

    fn handle_startup_event(&mut self, _phase: StartupPhase, _time: MillisecondTime) {}

    fn handle_outlet_event(&mut self, _event: &OutletEvent, _time: MillisecondTime) {}
}

/// Handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EventHandler for NullHandler {}
