//! Patch replacement while the audio thread keeps running
//!
//! The audio thread is simulated by a spawned thread calling `Engine::process`;
//! `SlowPatcher` keeps it inside the callback long enough to race a controller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cadenza::prelude::*;
use cadenza::{DataType, Error};
use parking_lot::Mutex;

use crate::helpers::*;

#[test]
fn test_swap_replaces_patch_between_blocks() {
    let engine = test_engine(SlowPatcher::boxed(1.0, Duration::ZERO));
    assert_eq!(render_block(&engine, 64).unwrap()[0], 1.0);

    let before = engine.target();
    engine
        .set_patcher(SlowPatcher::boxed(2.0, Duration::ZERO))
        .unwrap();
    assert_ne!(engine.target(), before);
    assert_eq!(render_block(&engine, 64).unwrap()[0], 2.0);
}

#[test]
fn test_timed_out_swap_keeps_old_patch() {
    init_tracing();
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .lock_timeout(Duration::from_millis(20))
        .patcher(SlowPatcher::signalling(1.0, Duration::from_millis(300), &entered_tx))
        .build()
        .unwrap();

    let audio = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || render_block(&engine, 64))
    };
    entered_rx.recv().unwrap();

    let result = engine.set_patcher(SlowPatcher::boxed(2.0, Duration::ZERO));
    assert!(matches!(result, Err(Error::LockTimeout(_))));
    assert!(!engine.is_swap_pending());

    assert_eq!(audio.join().unwrap().unwrap()[0], 1.0);
    assert_eq!(render_block(&engine, 64).unwrap()[0], 1.0);
}

#[test]
fn test_process_declines_while_swap_pending() {
    init_tracing();
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let engine = test_engine(SlowPatcher::signalling(
        1.0,
        Duration::from_millis(200),
        &entered_tx,
    ));

    let audio = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || render_block(&engine, 64))
    };
    entered_rx.recv().unwrap();

    let controller = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.set_patcher(SlowPatcher::boxed(2.0, Duration::ZERO)))
    };
    while !engine.is_swap_pending() {
        thread::yield_now();
    }

    // A callback arriving while the swap waits is skipped, not blocked.
    assert!(render_block(&engine, 64).is_none());

    assert!(audio.join().unwrap().is_some());
    controller.join().unwrap().unwrap();
    assert_eq!(render_block(&engine, 64).unwrap()[0], 2.0);
}

#[test]
fn test_swap_drops_old_patch_clocks() {
    let old_ticks = Arc::new(AtomicUsize::new(0));
    let new_ticks = Arc::new(AtomicUsize::new(0));
    let engine = test_engine(ClockPatcher::boxed(20.0, &old_ticks));

    // ~32 ms: one tick at 20 ms
    for _ in 0..3 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_eq!(old_ticks.load(Ordering::SeqCst), 1);

    engine
        .set_patcher(ClockPatcher::boxed(20.0, &new_ticks))
        .unwrap();
    for _ in 0..6 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_eq!(old_ticks.load(Ordering::SeqCst), 1);
    assert!(new_ticks.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_external_data_follows_swaps() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(Mutex::new(Vec::new()));
    let engine = test_engine(SamplePlayer::boxed("sample", &updates));

    let sink = Arc::clone(&released);
    engine
        .set_external_data(
            "sample",
            vec![7u8; 16],
            DataType::Untyped,
            Box::new(move |name: String, buffer: Vec<u8>| sink.lock().push((name, buffer))),
        )
        .unwrap();
    assert_eq!(render_block(&engine, 64).unwrap()[0], 7.0);
    assert_eq!(updates.lock().clone(), vec![0]);

    // Same name: the buffer moves to the new patch.
    engine
        .set_patcher(SamplePlayer::boxed("sample", &updates))
        .unwrap();
    assert_eq!(render_block(&engine, 64).unwrap()[0], 7.0);
    assert_eq!(updates.lock().len(), 2);
    assert!(released.lock().is_empty());

    // No matching DataRef: the buffer is handed back.
    engine
        .set_patcher(SamplePlayer::boxed("other", &updates))
        .unwrap();
    assert_eq!(render_block(&engine, 64).unwrap()[0], 0.0);
    let released = released.lock();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].0, "sample");
    assert_eq!(released[0].1, vec![7u8; 16]);
    assert!(!engine.has_external_data("sample"));
}

#[test]
fn test_release_external_data() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(Mutex::new(Vec::new()));
    let engine = test_engine(SamplePlayer::boxed("sample", &updates));

    let sink = Arc::clone(&released);
    engine
        .set_external_data(
            "sample",
            vec![3u8; 4],
            DataType::Untyped,
            Box::new(move |name: String, buffer: Vec<u8>| sink.lock().push((name, buffer.len()))),
        )
        .unwrap();
    engine.release_external_data("sample").unwrap();
    assert_eq!(released.lock().clone(), vec![("sample".to_string(), 4)]);
    assert_eq!(render_block(&engine, 64).unwrap()[0], 0.0);

    assert!(matches!(
        engine.release_external_data("sample"),
        Err(Error::UnknownDataRef(_))
    ));
}

#[test]
fn test_pending_data_update_dropped_with_patch() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(Mutex::new(Vec::new()));
    let engine = test_engine(SamplePlayer::boxed("sample", &updates));

    let sink = Arc::clone(&released);
    engine
        .set_external_data(
            "sample",
            vec![5u8; 8],
            DataType::Untyped,
            Box::new(move |name: String, _buffer: Vec<u8>| sink.lock().push(name)),
        )
        .unwrap();
    // Swap before the update event is dispatched.
    engine
        .set_patcher(SamplePlayer::boxed("other", &updates))
        .unwrap();
    render_block(&engine, 64).unwrap();

    assert!(updates.lock().is_empty());
    assert_eq!(released.lock().clone(), vec!["sample".to_string()]);
}

#[test]
fn test_control_calls_never_skip_blocks() {
    let engine = test_engine(TestSynth::boxed());
    let params = Arc::new(SyncInterface::new(&engine, Box::new(NullHandler)).unwrap());

    let controller = {
        let engine = Arc::clone(&engine);
        let params = Arc::clone(&params);
        thread::spawn(move || {
            for _ in 0..20_000 {
                engine.schedule_event(Event::parameter(0, 0.5, 0.0));
                let _ = engine.parameter_value(0);
                params.set_parameter_value(0, 0.5, 0.0).unwrap();
                let _ = params.parameter_value(0);
            }
        })
    };

    while !controller.is_finished() {
        assert!(render_block(&engine, 64).is_some(), "audio block was skipped");
    }
    controller.join().unwrap();
    render_block(&engine, 64).unwrap();
    assert_eq!(engine.parameter_value(0), 0.5);
}
