//! Contract between the engine and the signal-processing patch it drives.

use crate::context::EngineContext;
use crate::dataref::DataRef;
use crate::event::{
    ClockEvent, EventTarget, MessageEvent, MessageTag, MidiEvent, OutletEvent, ParameterIndex,
    TimeSignature, TransportState,
};
use crate::parameter::ParameterInfo;
use crate::state::Preset;

/// A signal-processing graph driven by the engine.
///
/// Only [`Patcher::process`] is required. Event entry points default to no-ops, except
/// [`Patcher::process_outlet_event`] which forwards the value to the engine's listeners.
pub trait Patcher: Send {
    /// Called once after the patch is attached, before any event is dispatched.
    fn initialize(&mut self, _ctx: &mut EngineContext<'_>) {}

    fn prepare_to_process(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    fn num_input_channels(&self) -> usize {
        0
    }

    fn num_output_channels(&self) -> usize {
        0
    }

    /// Render one block over non-interleaved channel slices of `frames` samples.
    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        ctx: &mut EngineContext<'_>,
    );

    fn num_parameters(&self) -> usize {
        0
    }

    fn parameter_info(&self, _index: ParameterIndex) -> ParameterInfo {
        ParameterInfo::default()
    }

    fn parameter_id(&self, _index: ParameterIndex) -> &str {
        ""
    }

    fn parameter_name(&self, index: ParameterIndex) -> &str {
        self.parameter_id(index)
    }

    fn parameter_value(&self, _index: ParameterIndex) -> f64 {
        0.0
    }

    fn set_parameter_value(
        &mut self,
        _index: ParameterIndex,
        _value: f64,
        _ctx: &mut EngineContext<'_>,
    ) {
    }

    fn process_midi_event(&mut self, _event: &MidiEvent, _ctx: &mut EngineContext<'_>) {}

    fn process_message(&mut self, _message: &MessageEvent, _ctx: &mut EngineContext<'_>) {}

    fn process_clock_event(
        &mut self,
        _target: Option<EventTarget>,
        _clock: &ClockEvent,
        _ctx: &mut EngineContext<'_>,
    ) {
    }

    fn process_outlet_event(&mut self, outlet: &OutletEvent, ctx: &mut EngineContext<'_>) {
        ctx.send_outlet(outlet.index, outlet.value);
    }

    fn process_transport(&mut self, _state: TransportState, _ctx: &mut EngineContext<'_>) {}

    fn process_tempo(&mut self, _bpm: f64, _ctx: &mut EngineContext<'_>) {}

    fn process_beat_time(&mut self, _beats: f64, _ctx: &mut EngineContext<'_>) {}

    fn process_time_signature(&mut self, _signature: TimeSignature, _ctx: &mut EngineContext<'_>) {}

    fn process_data_ref_event(&mut self, _index: usize, _ctx: &mut EngineContext<'_>) {}

    /// Name of a message tag, for diagnostics and host-side routing.
    fn resolve_tag(&self, _tag: MessageTag) -> Option<&str> {
        None
    }

    fn num_data_refs(&self) -> usize {
        0
    }

    fn data_ref(&self, _index: usize) -> Option<&DataRef> {
        None
    }

    fn data_ref_mut(&mut self, _index: usize) -> Option<&mut DataRef> {
        None
    }

    /// Write the patch state into `preset`.
    fn get_preset(&self, _preset: &mut Preset) {}

    fn set_preset(&mut self, _preset: &Preset, _ctx: &mut EngineContext<'_>) {}
}

/// Index of the DataRef named `name`.
pub fn data_ref_index(patcher: &dyn Patcher, name: &str) -> Option<usize> {
    (0..patcher.num_data_refs()).find(|&i| patcher.data_ref(i).is_some_and(|d| d.name() == name))
}

/// Installed while no patch is attached. Outputs silence.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPatcher;

impl Patcher for NullPatcher {
    fn process(
        &mut self,
        _inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _ctx: &mut EngineContext<'_>,
    ) {
        for channel in outputs.iter_mut() {
            let n = frames.min(channel.len());
            channel[..n].fill(0.0);
        }
    }
}
