//! Preset integration tests
//!
//! Snapshots through the engine, JSON round trips and asynchronous get/set with
//! completion callbacks.

use std::sync::Arc;

use cadenza::prelude::*;
use cadenza::{preset_from_str, preset_to_string, PresetEventKind};
use parking_lot::Mutex;

use crate::helpers::*;

#[test]
fn test_voice_preset_survives_json_round_trip() {
    let engine = test_engine(TestSynth::boxed());
    let original = voice_preset(0.5, 3);
    engine.set_preset_sync(&original).unwrap();

    let snapshot = engine.preset_sync().unwrap();
    assert_eq!(snapshot, original);

    let json = preset_to_string(&snapshot).unwrap();
    engine.set_preset_sync(&voice_preset(0.0, 0)).unwrap();
    let restored = preset_from_str(&json).unwrap();
    assert_eq!(restored, original);
    assert_eq!(restored.sub_state_array("voices").map(|v| v.len()), Some(3));
    for i in 0..3 {
        let pitch = restored.sub_state_at("voices", i).and_then(|v| v.number("pitch"));
        assert_eq!(pitch, Some(i as f64));
    }

    engine.set_preset_sync(&restored).unwrap();
    assert_eq!(engine.preset_sync().unwrap(), original);
    assert_eq!(render_block(&engine, 64).unwrap()[0], 0.5);
}

#[test]
fn test_set_preset_sync_reports_changes() {
    let engine = test_engine(TestSynth::boxed());
    let events = RecordingHandler::default();
    let params = SyncInterface::new(&engine, events.boxed()).unwrap();
    // Consume startup notifications first.
    render_block(&engine, 64).unwrap();
    events.events.lock().clear();

    engine.set_preset_sync(&voice_preset(0.25, 3)).unwrap();
    let kinds: Vec<_> = events
        .events
        .lock()
        .iter()
        .map(|e| match e.kind() {
            EventKind::Preset(p) => format!("{:?}", p.kind),
            EventKind::Parameter(p) => format!("param {}", p.value),
            other => format!("{:?}", other),
        })
        .collect();
    assert_eq!(kinds, vec!["SettingBegin", "param 0.25", "SettingEnd"]);
    assert_eq!(params.parameter_value(0), 0.25);

    // Applying the same preset again changes nothing.
    events.events.lock().clear();
    engine.set_preset_sync(&voice_preset(0.25, 3)).unwrap();
    assert!(events.parameters().is_empty());
    assert!(!events
        .events
        .lock()
        .iter()
        .any(|e| matches!(e.kind(), EventKind::Preset(p) if p.kind == PresetEventKind::Touched)));
}

#[test]
fn test_async_preset_callbacks_run_in_order() {
    let engine = test_engine(TestSynth::boxed());
    let log = Arc::new(Mutex::new(Vec::new()));

    let set_log = Arc::clone(&log);
    engine.set_preset(
        Arc::new(voice_preset(0.8, 3)),
        Some(Arc::new(move |preset: Arc<Preset>| {
            set_log.lock().push(("set", preset.number("gain")));
        })),
    );
    let get_log = Arc::clone(&log);
    engine.get_preset(Arc::new(move |preset: Arc<Preset>| {
        get_log.lock().push(("get", preset.number("gain")));
    }));

    // Nothing runs before the next dispatch.
    assert!(log.lock().is_empty());
    render_block(&engine, TEST_BUFFER_SIZE).unwrap();
    assert_eq!(
        log.lock().clone(),
        vec![("set", Some(0.8)), ("get", Some(0.8))]
    );
}

#[test]
fn test_preset_replaces_after_swap() {
    let engine = test_engine(TestSynth::boxed());
    engine.set_preset_sync(&voice_preset(0.6, 3)).unwrap();
    let saved = engine.preset_sync().unwrap();

    engine.set_patcher(TestSynth::boxed()).unwrap();
    assert_eq!(engine.preset_sync().unwrap().number("gain"), Some(0.0));

    engine.set_preset_sync(&saved).unwrap();
    assert_eq!(render_block(&engine, 64).unwrap()[0], 0.6);
}
