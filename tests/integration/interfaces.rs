//! Parameter interface integration tests
//!
//! Shadow values, notification delivery, coalescing and echo suppression for the
//! sync, trigger and async interfaces.

use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use cadenza::prelude::*;
use cadenza::{EngineConfig, Error, MessageTag, PresetEventKind};

use crate::helpers::*;

#[test]
fn test_scheduled_parameter_reaches_shadow_and_handler() {
    let engine = test_engine(TestSynth::boxed());
    let handler = RecordingHandler::default();
    let params = AsyncInterface::new(&engine, handler.boxed()).unwrap();

    engine.schedule_event(Event::parameter(0, 0.75, 0.0));
    let out = render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(out[0], 0.75);
    assert_eq!(params.parameter_value(0), 0.75);

    params.drain_events();
    assert_eq!(handler.parameters(), vec![(0, 0.75)]);
}

#[test]
fn test_parameter_metadata_from_table() {
    let engine = test_engine(TestSynth::boxed());
    let params = SyncInterface::new(&engine, Box::new(NullHandler)).unwrap();
    assert_eq!(params.num_parameters(), 1);
    assert_eq!(params.parameter_id(0).as_deref(), Some("gain"));
    assert_eq!(params.parameter_index_for_id("gain"), Some(0));
    assert_eq!(params.parameter_index_for_id("cutoff"), None);
    assert_eq!(params.parameter_info(0).map(|i| i.max), Some(1.0));
    assert!(params.parameter_info(3).is_none());
    assert_eq!(params.parameter_value(3), 0.0);
}

#[test]
fn test_async_writes_coalesce_within_block() {
    let engine = test_engine(TestSynth::boxed());
    let writer = AsyncInterface::new(&engine, Box::new(NullHandler)).unwrap();
    let listener_events = RecordingHandler::default();
    let listener = AsyncInterface::new(&engine, listener_events.boxed()).unwrap();

    for i in 1..=5 {
        writer
            .set_parameter_value(0, i as f64 / 10.0, 0.0)
            .unwrap();
    }
    // Shadow reflects the local write immediately.
    assert_eq!(writer.parameter_value(0), 0.5);

    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    listener.drain_events();
    assert_eq!(listener_events.parameters(), vec![(0, 0.5)]);
    assert_eq!(listener.parameter_value(0), 0.5);
}

#[test]
fn test_notifications_spaced_by_period() {
    init_tracing();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .notification_period_ms(15.0)
        .patcher(TestSynth::boxed())
        .build()
        .unwrap();
    let events = RecordingHandler::default();
    let listener = AsyncInterface::new(&engine, events.boxed()).unwrap();

    // One change per ~10.67 ms block, reported at most every 15 ms.
    for block in 0..6 {
        engine.schedule_event(Event::parameter(0, block as f64 / 10.0, 0.0));
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    listener.drain_events();
    let reported = events.parameters();
    assert!(reported.len() < 6, "{:?}", reported);
    assert_relative_eq!(listener.parameter_value(0), 0.5);
}

#[test]
fn test_own_echo_suppressed() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = AsyncInterface::new(&engine, events.boxed()).unwrap();

    params.set_parameter_value(0, 0.4, 0.0).unwrap();
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    params.drain_events();
    assert!(events.parameters().is_empty());

    // The patch clamps, so the notification differs from what was set and is delivered.
    params.set_parameter_value(0, 2.0, 0.0).unwrap();
    for _ in 0..3 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    params.drain_events();
    assert_eq!(events.parameters(), vec![(0, 1.0)]);
    assert_eq!(params.parameter_value(0), 1.0);
}

#[test]
fn test_touched_after_parameter_change() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = AsyncInterface::new(&engine, events.boxed()).unwrap();

    engine.schedule_event(Event::parameter(0, 0.2, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    params.drain_events();
    let touched = events
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e.kind(), EventKind::Preset(p) if p.kind == PresetEventKind::Touched))
        .count();
    assert_eq!(touched, 1);
}

#[test]
fn test_sync_interface_delivers_during_process() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = SyncInterface::new(&engine, events.boxed()).unwrap();

    params.set_parameter_value(0, 0.6, 0.0).unwrap();
    assert!(events.parameters().is_empty());

    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(events.parameters(), vec![(0, 0.6)]);
    assert_eq!(params.parameter_value(0), 0.6);
    let source = events.events.lock().iter().find_map(|e| e.source());
    assert_eq!(source, Some(params.id()));
}

#[test]
fn test_trigger_interface_dispatches_immediately() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = TriggerInterface::new(&engine, events.boxed()).unwrap();

    params.set_parameter_value(0, 0.35, 0.0).unwrap();
    assert_eq!(params.parameter_value(0), 0.35);
    assert_eq!(engine.parameter_value(0), 0.35);
    assert_eq!(events.parameters(), vec![(0, 0.35)]);
    assert_eq!(engine.current_time(), 0.0);
}

#[test]
fn test_normalized_set_uses_parameter_range() {
    let engine = test_engine(TestSynth::boxed());
    let params = TriggerInterface::new(&engine, Box::new(NullHandler)).unwrap();
    params.set_parameter_value_normalized(0, 0.5, 0.0).unwrap();
    assert_relative_eq!(engine.parameter_value(0), 0.5);
}

#[test]
fn test_single_producer_queue_is_lossless() {
    init_tracing();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .queue_capacity(4)
        .patcher(TestSynth::boxed())
        .build()
        .unwrap();
    let writer =
        AsyncInterface::with_mode(&engine, QueueMode::SingleProducer, Box::new(NullHandler))
            .unwrap();
    assert_eq!(writer.queue_mode(), QueueMode::SingleProducer);
    let events = RecordingHandler::default();
    let _listener = SyncInterface::new(&engine, events.boxed()).unwrap();

    for i in 0..20 {
        writer
            .set_parameter_value(0, i as f64 / 20.0, i as f64 * 0.1)
            .unwrap();
    }
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();

    let values: Vec<f64> = events.parameters().into_iter().map(|(_, v)| v).collect();
    let expected: Vec<f64> = (0..20).map(|i| i as f64 / 20.0).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_multi_producer_from_many_threads() {
    let engine = test_engine(TestSynth::boxed());
    let writer = Arc::new(
        AsyncInterface::with_mode(&engine, QueueMode::MultiProducer, Box::new(NullHandler))
            .unwrap(),
    );
    let events = RecordingHandler::default();
    let _listener = SyncInterface::new(&engine, events.boxed()).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for i in 0..25 {
                    writer
                        .send_message(MessageTag::new("in1"), MessagePayload::Number(i as f64), 0.0)
                        .unwrap();
                    writer
                        .set_parameter_value(0, (t * 25 + i) as f64 / 100.0, 0.0)
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(events.parameters().len(), 100);
}

#[test]
fn test_interface_limit_and_deregistration() {
    init_tracing();
    let engine = Engine::builder()
        .config(EngineConfig {
            max_interfaces: 2,
            ..EngineConfig::default()
        })
        .sample_rate(TEST_SAMPLE_RATE)
        .build()
        .unwrap();

    let first = engine
        .create_parameter_interface(InterfaceKind::Sync, Box::new(NullHandler))
        .unwrap();
    let _second = engine
        .create_parameter_interface(InterfaceKind::default(), Box::new(NullHandler))
        .unwrap();
    assert!(matches!(
        engine.create_parameter_interface(InterfaceKind::Trigger, Box::new(NullHandler)),
        Err(Error::TooManyInterfaces(2))
    ));
    assert_eq!(engine.num_interfaces(), 2);

    drop(first);
    assert_eq!(engine.num_interfaces(), 1);
    assert!(engine
        .create_parameter_interface(InterfaceKind::Trigger, Box::new(NullHandler))
        .is_ok());
}

#[test]
fn test_dropped_interface_stops_receiving() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = SyncInterface::new(&engine, events.boxed()).unwrap();
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    let seen = events.events.lock().len();
    drop(params);

    engine.schedule_event(Event::parameter(0, 0.9, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(events.events.lock().len(), seen);
}

#[test]
fn test_shadows_follow_patch_swap() {
    let engine = test_engine(TestSynth::boxed());
    let params = SyncInterface::new(&engine, Box::new(NullHandler)).unwrap();
    engine.schedule_event(Event::parameter(0, 0.5, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(params.parameter_value(0), 0.5);

    engine.set_patcher(Box::new(NullPatcher)).unwrap();
    assert_eq!(params.num_parameters(), 0);
    assert_eq!(engine.parameter_table().len(), 0);
}

#[test]
fn test_late_event_after_trigger_keeps_time_order() {
    let engine = test_engine(TestSynth::boxed());
    let trigger = TriggerInterface::new(&engine, Box::new(NullHandler)).unwrap();

    trigger.set_parameter_value(0, 0.1, 50.0).unwrap();
    assert_eq!(engine.parameter_value(0), 0.1);

    // Scheduled after the 50 ms change, so it must not run before it.
    engine.schedule_event(Event::parameter(0, 0.2, 5.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(engine.parameter_value(0), 0.1);

    while engine.current_time() <= 50.0 {
        render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    }
    assert_eq!(engine.parameter_value(0), 0.2);
}

#[test]
fn test_async_listener_sees_changes_made_outside_blocks() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let listener = AsyncInterface::new(&engine, events.boxed()).unwrap();
    let trigger = TriggerInterface::new(&engine, Box::new(NullHandler)).unwrap();

    engine.set_preset_sync(&voice_preset(0.3, 3)).unwrap();
    listener.drain_events();
    assert_eq!(events.parameters(), vec![(0, 0.3)]);

    trigger.set_parameter_value(0, 0.7, 0.0).unwrap();
    listener.drain_events();
    assert_eq!(events.parameters(), vec![(0, 0.3), (0, 0.7)]);
    assert_eq!(listener.parameter_value(0), 0.7);
}

#[test]
fn test_held_notification_delivered_across_swap() {
    init_tracing();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .notification_period_ms(15.0)
        .patcher(TestSynth::boxed())
        .build()
        .unwrap();
    let events = RecordingHandler::default();
    let listener = AsyncInterface::new(&engine, events.boxed()).unwrap();

    engine.schedule_event(Event::parameter(0, 0.1, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    // Second change lands within the period and is held back.
    engine.schedule_event(Event::parameter(0, 0.2, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();

    engine.set_patcher(TestSynth::boxed()).unwrap();
    listener.drain_events();
    assert_eq!(events.parameters(), vec![(0, 0.1), (0, 0.2)]);
}

/// Writes half of every value it is told about back through `peer`.
struct HalvingHandler {
    peer: Arc<OnceLock<Weak<AsyncInterface>>>,
}

impl EventHandler for HalvingHandler {
    fn handle_event(&mut self, event: &Event) {
        let EventKind::Parameter(parameter) = event.kind() else {
            return;
        };
        if let Some(peer) = self.peer.get().and_then(Weak::upgrade) {
            peer.set_parameter_value(parameter.index, parameter.value * 0.5, event.time())
                .unwrap();
        }
    }
}

#[test]
fn test_handler_may_set_parameters_while_draining() {
    let engine = test_engine(TestSynth::boxed());
    let peer = Arc::new(OnceLock::new());
    let params = Arc::new(
        AsyncInterface::new(
            &engine,
            Box::new(HalvingHandler {
                peer: Arc::clone(&peer),
            }),
        )
        .unwrap(),
    );
    let _ = peer.set(Arc::downgrade(&params));

    engine.schedule_event(Event::parameter(0, 0.8, 0.0));
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    {
        let params = Arc::clone(&params);
        thread::spawn(move || {
            params.drain_events();
            let _ = done_tx.send(());
        });
    }
    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "drain_events did not return"
    );
    assert_eq!(params.parameter_value(0), 0.4);

    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(engine.parameter_value(0), 0.4);
    // The patch reports back exactly what was set, so nothing is delivered again.
    params.drain_events();
    assert_eq!(params.parameter_value(0), 0.4);
}
