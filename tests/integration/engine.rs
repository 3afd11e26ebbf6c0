//! Engine lifecycle integration tests
//!
//! Preparation, block processing, MIDI routing and event dispatch through the
//! thread-safe `Engine`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use cadenza::prelude::*;
use cadenza::Error;

use crate::helpers::*;

#[test]
fn test_unprepared_engine_outputs_silence() {
    init_tracing();
    let engine = Engine::builder().patcher(TestSynth::boxed()).build().unwrap();
    engine.schedule_event(Event::parameter(0, 0.5, 0.0));

    let mut out = vec![1.0f32; 64];
    {
        let mut outputs = [out.as_mut_slice()];
        assert!(engine.process(&[], &mut outputs, 64, None, None));
    }
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(engine.current_time(), 0.0);
}

#[test]
fn test_prepare_rejects_invalid_settings() {
    let engine = Engine::builder().build().unwrap();
    assert!(matches!(
        engine.prepare_to_process(f64::NAN, 512),
        Err(Error::Core(cadenza::core::Error::InvalidSampleRate(_)))
    ));
    assert!(matches!(
        engine.prepare_to_process(TEST_SAMPLE_RATE, 0),
        Err(Error::Core(cadenza::core::Error::InvalidBlockSize(0)))
    ));
    assert_eq!(engine.sample_rate(), 0.0);
}

#[test]
fn test_time_advances_per_block() {
    let engine = test_engine(TestSynth::boxed());
    for _ in 0..4 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_relative_eq!(
        engine.current_time(),
        4.0 * block_ms(TEST_BUFFER_SIZE),
        epsilon = 1e-9
    );
}

#[test]
fn test_parameter_applies_inside_its_block() {
    let engine = test_engine(TestSynth::boxed());
    let later = block_ms(TEST_BUFFER_SIZE) * 1.5;
    engine.schedule_event(Event::parameter(0, 0.25, 0.0));
    engine.schedule_event(Event::parameter(0, 0.5, later));

    let first = render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(first[0], 0.25);
    let second = render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(second[0], 0.5);
    assert_eq!(engine.parameter_value(0), 0.5);
}

#[test]
fn test_process_events_until_dispatches_without_audio() {
    let engine = test_engine(TestSynth::boxed());
    engine.schedule_event(Event::parameter(0, 0.3, 2.0));
    engine.schedule_event(Event::parameter(0, 0.9, 20.0));

    engine.process_events_until(5.0).unwrap();
    assert_eq!(engine.parameter_value(0), 0.3);
    assert_eq!(engine.current_time(), 0.0);
}

#[test]
fn test_stale_events_run_at_block_start() {
    let engine = test_engine(TestSynth::boxed());
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    // Already in the past; moved to the current time.
    engine.schedule_event(Event::parameter(0, 0.8, 0.0));
    let out = render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(out[0], 0.8);
}

#[test]
fn test_midi_out_frame_offsets() {
    struct Echo;

    impl Patcher for Echo {
        fn process(
            &mut self,
            _inputs: &[&[f32]],
            _outputs: &mut [&mut [f32]],
            _frames: usize,
            _ctx: &mut EngineContext<'_>,
        ) {
        }

        fn process_midi_event(&mut self, event: &MidiEvent, ctx: &mut EngineContext<'_>) {
            ctx.send_midi(*event);
        }
    }

    let engine = test_engine(Box::new(Echo));
    let midi_in = [
        TimedMidiEvent::new(0, MidiEvent::note_on(0, 0, 60, 100)),
        TimedMidiEvent::new(200, MidiEvent::note_off(0, 0, 60)),
    ];
    let mut midi_out = Vec::new();
    let mut out = vec![0.0f32; TEST_BUFFER_SIZE];
    {
        let mut outputs = [out.as_mut_slice()];
        assert!(engine.process(
            &[],
            &mut outputs,
            TEST_BUFFER_SIZE,
            Some(&midi_in),
            Some(&mut midi_out)
        ));
    }
    let offsets: Vec<_> = midi_out.iter().map(|m| m.frame_offset).collect();
    assert_eq!(offsets, vec![0, 200]);
    assert_eq!(midi_out[0].event.status(), Some(0x90));
}

#[test]
fn test_flush_clock_events() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let engine = test_engine(ClockPatcher::boxed(100.0, &ticks));

    // A bare id does not match the patch's targeted clock.
    assert_eq!(
        engine
            .flush_clock_events(None, ClockPatcher::CLOCK, false)
            .unwrap(),
        0
    );
    assert_eq!(
        engine
            .flush_clock_events(Some(engine.target()), ClockPatcher::CLOCK, false)
            .unwrap(),
        1
    );
    for _ in 0..20 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_flush_clock_events_executes_now() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let engine = test_engine(ClockPatcher::boxed(100.0, &ticks));
    assert_eq!(
        engine
            .flush_clock_events(Some(engine.target()), ClockPatcher::CLOCK, true)
            .unwrap(),
        1
    );
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clock_ticks_follow_time() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let engine = test_engine(ClockPatcher::boxed(10.0, &ticks));
    // Ten blocks of ~10.67 ms cover ticks at 10, 20, ..., 100 ms.
    for _ in 0..10 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 10);
}
