//! Test helpers and fixtures for cadenza integration tests
//!
//! Patches here are small and deterministic; audio is rendered by calling
//! `Engine::process` by hand, one block at a time.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadenza::prelude::*;
use cadenza::{ClockEvent, ClockId, DataRef, EventTarget, PatcherState};
use parking_lot::Mutex;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

/// Route engine logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Prepared engine running `patcher`.
pub fn test_engine(patcher: Box<dyn Patcher>) -> Arc<Engine> {
    init_tracing();
    Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .max_block_size(TEST_BUFFER_SIZE)
        .patcher(patcher)
        .build()
        .expect("Failed to create test engine")
}

/// Run one mono block; `None` if the engine declined it.
pub fn render_block(engine: &Engine, frames: usize) -> Option<Vec<f32>> {
    let mut out = vec![0.0f32; frames];
    let processed = {
        let mut outputs = [out.as_mut_slice()];
        engine.process(&[], &mut outputs, frames, None, None)
    };
    processed.then_some(out)
}

/// Duration of `frames` samples at the test rate, in milliseconds.
pub fn block_ms(frames: usize) -> f64 {
    frames as f64 * 1000.0 / TEST_SAMPLE_RATE
}

/// Outputs its `gain` parameter as a constant signal.
///
/// Presets store `gain` plus a `voices` array with one `pitch` per voice.
pub struct TestSynth {
    pub gain: f64,
    pub pitches: Vec<f64>,
}

impl TestSynth {
    pub fn boxed() -> Box<Self> {
        Box::new(Self {
            gain: 0.0,
            pitches: vec![0.0; 3],
        })
    }
}

impl Patcher for TestSynth {
    fn process(
        &mut self,
        _inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _ctx: &mut EngineContext<'_>,
    ) {
        for channel in outputs.iter_mut() {
            channel[..frames].fill(self.gain as f32);
        }
    }

    fn num_output_channels(&self) -> usize {
        1
    }

    fn num_parameters(&self) -> usize {
        1
    }

    fn parameter_info(&self, _index: usize) -> ParameterInfo {
        ParameterInfo::number(0.0, 1.0, 0.0)
    }

    fn parameter_id(&self, _index: usize) -> &str {
        "gain"
    }

    fn parameter_value(&self, _index: usize) -> f64 {
        self.gain
    }

    fn set_parameter_value(&mut self, _index: usize, value: f64, _ctx: &mut EngineContext<'_>) {
        self.gain = value.clamp(0.0, 1.0);
    }

    fn get_preset(&self, preset: &mut Preset) {
        preset.set("gain", self.gain);
        for (i, pitch) in self.pitches.iter().enumerate() {
            preset.sub_state_at_mut("voices", i).set("pitch", *pitch);
        }
    }

    fn set_preset(&mut self, preset: &Preset, _ctx: &mut EngineContext<'_>) {
        if let Some(gain) = preset.number("gain") {
            self.gain = gain;
        }
        for (i, pitch) in self.pitches.iter_mut().enumerate() {
            if let Some(value) = preset.sub_state_at("voices", i).and_then(|v| v.number("pitch")) {
                *pitch = value;
            }
        }
    }
}

/// Holds the audio thread inside `process` for a fixed time and outputs `tag`.
pub struct SlowPatcher {
    pub delay: Duration,
    pub tag: f32,
    /// Signalled each time `process` is entered.
    pub entered: Option<crossbeam_channel::Sender<()>>,
}

impl SlowPatcher {
    pub fn boxed(tag: f32, delay: Duration) -> Box<Self> {
        Box::new(Self {
            delay,
            tag,
            entered: None,
        })
    }

    pub fn signalling(
        tag: f32,
        delay: Duration,
        entered: &crossbeam_channel::Sender<()>,
    ) -> Box<Self> {
        Box::new(Self {
            delay,
            tag,
            entered: Some(entered.clone()),
        })
    }
}

impl Patcher for SlowPatcher {
    fn process(
        &mut self,
        _inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _ctx: &mut EngineContext<'_>,
    ) {
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        std::thread::sleep(self.delay);
        for channel in outputs.iter_mut() {
            channel[..frames].fill(self.tag);
        }
    }
}

/// Ticks a clock every `period` milliseconds from the moment it is attached.
pub struct ClockPatcher {
    pub period: f64,
    pub ticks: Arc<AtomicUsize>,
}

impl ClockPatcher {
    pub const CLOCK: ClockId = 1;

    pub fn boxed(period: f64, ticks: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            period,
            ticks: Arc::clone(ticks),
        })
    }
}

impl Patcher for ClockPatcher {
    fn initialize(&mut self, ctx: &mut EngineContext<'_>) {
        let next = ctx.current_time() + self.period;
        ctx.schedule_clock(Self::CLOCK, None, next);
    }

    fn process(
        &mut self,
        _inputs: &[&[f32]],
        _outputs: &mut [&mut [f32]],
        _frames: usize,
        _ctx: &mut EngineContext<'_>,
    ) {
    }

    fn process_clock_event(
        &mut self,
        _target: Option<EventTarget>,
        clock: &ClockEvent,
        ctx: &mut EngineContext<'_>,
    ) {
        if clock.clock_id == Self::CLOCK {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            let next = ctx.current_time() + self.period;
            ctx.schedule_clock(Self::CLOCK, None, next);
        }
    }
}

/// Exposes one DataRef and counts the update events it receives.
pub struct SamplePlayer {
    pub sample: DataRef,
    pub updates: Arc<Mutex<Vec<usize>>>,
}

impl SamplePlayer {
    pub fn boxed(name: &str, updates: &Arc<Mutex<Vec<usize>>>) -> Box<Self> {
        Box::new(Self {
            sample: DataRef::new(name),
            updates: Arc::clone(updates),
        })
    }
}

impl Patcher for SamplePlayer {
    fn process(
        &mut self,
        _inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _ctx: &mut EngineContext<'_>,
    ) {
        let first = self.sample.data().first().copied().unwrap_or(0);
        for channel in outputs.iter_mut() {
            channel[..frames].fill(first as f32);
        }
    }

    fn num_data_refs(&self) -> usize {
        1
    }

    fn data_ref(&self, index: usize) -> Option<&DataRef> {
        (index == 0).then_some(&self.sample)
    }

    fn data_ref_mut(&mut self, index: usize) -> Option<&mut DataRef> {
        (index == 0).then_some(&mut self.sample)
    }

    fn process_data_ref_event(&mut self, index: usize, _ctx: &mut EngineContext<'_>) {
        self.updates.lock().push(index);
    }
}

/// Collects every delivered event.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn boxed(&self) -> Box<dyn EventHandler> {
        Box::new(self.clone())
    }

    /// `(index, value)` of every parameter notification seen so far.
    pub fn parameters(&self) -> Vec<(usize, f64)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e.kind() {
                EventKind::Parameter(p) => Some((p.index, p.value)),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for RecordingHandler {
    fn handle_event(&mut self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// A preset with `gain` and one `pitch` per voice.
pub fn voice_preset(gain: f64, voices: usize) -> PatcherState {
    let mut preset = PatcherState::new();
    preset.set("gain", gain);
    for i in 0..voices {
        preset.sub_state_at_mut("voices", i).set("pitch", i as f64);
    }
    preset
}
