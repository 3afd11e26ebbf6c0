//! Event model: one closed sum type for everything the engine delivers to a patch.
//!
//! Every [`Event`] carries a timestamp in milliseconds, an optional [`EventTarget`]
//! and an [`EventKind`] payload. Events are plain values: cloning duplicates the
//! payload (list messages own their data), moving transfers it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::Preset;

/// Engine time in milliseconds.
pub type MillisecondTime = f64;

/// Index into a patch's parameter list.
pub type ParameterIndex = usize;

/// Identifier of a clock owned by a patch object.
pub type ClockId = u32;

/// Identity token of the patch instance (and optionally one of its sub-objects)
/// an event is addressed to.
///
/// The engine hands every attached patch a fresh generation. Events addressed to a
/// generation that is no longer attached are erased on patch replacement instead of
/// being redirected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventTarget {
    generation: u32,
    node: u32,
}

impl EventTarget {
    /// The top-level target of a patch generation.
    pub const fn root(generation: u32) -> Self {
        Self {
            generation,
            node: 0,
        }
    }

    /// A sub-object of the same patch generation.
    pub const fn child(self, node: u32) -> Self {
        Self {
            generation: self.generation,
            node,
        }
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub const fn node(self) -> u32 {
        self.node
    }
}

/// Hashed message tag (32-bit FNV-1a of the tag name).
///
/// ```
/// use cadenza_core::MessageTag;
///
/// const FREQ: MessageTag = MessageTag::new("freq");
/// assert_eq!(FREQ, MessageTag::new("freq"));
/// assert_ne!(FREQ, MessageTag::new("gain"));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageTag(u32);

impl MessageTag {
    /// The empty tag, used when a message has no object id.
    pub const NONE: MessageTag = MessageTag(0);

    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        MessageTag(hash)
    }

    pub const fn from_raw(raw: u32) -> Self {
        MessageTag(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identifies the parameter interface an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(u64);

impl InterfaceId {
    pub const fn new(raw: u64) -> Self {
        InterfaceId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterEvent {
    pub index: ParameterIndex,
    pub value: f64,
    /// Interface that produced the change, `None` for engine or patch originated changes.
    pub source: Option<InterfaceId>,
}

/// A short MIDI message (status byte plus up to two data bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    pub port: u32,
    bytes: [u8; 3],
    len: u8,
}

impl MidiEvent {
    /// Bytes beyond the third are ignored; system exclusive is not carried.
    pub fn new(port: u32, data: &[u8]) -> Self {
        let len = data.len().min(3);
        let mut bytes = [0u8; 3];
        bytes[..len].copy_from_slice(&data[..len]);
        Self {
            port,
            bytes,
            len: len as u8,
        }
    }

    pub fn note_on(port: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(port, &[0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f])
    }

    pub fn note_off(port: u32, channel: u8, note: u8) -> Self {
        Self::new(port, &[0x80 | (channel & 0x0f), note & 0x7f, 0])
    }

    pub fn control_change(port: u32, channel: u8, control: u8, value: u8) -> Self {
        Self::new(port, &[0xb0 | (channel & 0x0f), control & 0x7f, value & 0x7f])
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub fn status(&self) -> Option<u8> {
        self.data().first().copied()
    }
}

/// MIDI event positioned inside an audio block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedMidiEvent {
    /// Offset within the current buffer (0 = first sample).
    pub frame_offset: usize,
    pub event: MidiEvent,
}

impl TimedMidiEvent {
    pub fn new(frame_offset: usize, event: MidiEvent) -> Self {
        Self {
            frame_offset,
            event,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessagePayload {
    Number(f64),
    List(Vec<f64>),
    Bang,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    pub tag: MessageTag,
    /// Object the message is addressed to inside the patch, [`MessageTag::NONE`] for inports.
    pub object_id: MessageTag,
    pub payload: MessagePayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresetEventKind {
    Get,
    Set,
    Touched,
    SettingBegin,
    SettingEnd,
}

/// Completion callback of an asynchronous preset get/set. Runs on the thread that
/// dispatches the event (usually the audio thread).
pub type PresetCallback = Arc<dyn Fn(Arc<Preset>) + Send + Sync>;

#[derive(Clone)]
pub struct PresetEvent {
    pub kind: PresetEventKind,
    pub preset: Option<Arc<Preset>>,
    pub callback: Option<PresetCallback>,
}

impl PresetEvent {
    pub fn notification(kind: PresetEventKind) -> Self {
        Self {
            kind,
            preset: None,
            callback: None,
        }
    }
}

impl fmt::Debug for PresetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresetEvent")
            .field("kind", &self.kind)
            .field("preset", &self.preset.as_ref().map(|p| p.len()))
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockEvent {
    pub clock_id: ClockId,
    pub value: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Stopped,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutletEvent {
    pub index: usize,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupPhase {
    Begin,
    End,
}

/// Payload of an [`Event`].
#[derive(Clone, Debug)]
pub enum EventKind {
    Parameter(ParameterEvent),
    Midi(MidiEvent),
    Message(MessageEvent),
    Preset(PresetEvent),
    Clock(ClockEvent),
    Transport(TransportState),
    /// Beats per minute.
    Tempo(f64),
    /// Musical position in beats.
    BeatTime(f64),
    TimeSignature(TimeSignature),
    /// Index of the DataRef whose contents changed.
    DataRefUpdated(usize),
    OutletValue(OutletEvent),
    Startup(StartupPhase),
}

/// A timestamped, optionally targeted event.
#[derive(Clone, Debug)]
pub struct Event {
    time: MillisecondTime,
    target: Option<EventTarget>,
    kind: EventKind,
}

impl Event {
    pub fn new(time: MillisecondTime, kind: EventKind) -> Self {
        Self {
            time,
            target: None,
            kind,
        }
    }

    pub fn parameter(index: ParameterIndex, value: f64, time: MillisecondTime) -> Self {
        Self::new(
            time,
            EventKind::Parameter(ParameterEvent {
                index,
                value,
                source: None,
            }),
        )
    }

    pub fn midi(event: MidiEvent, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::Midi(event))
    }

    pub fn message(tag: MessageTag, payload: MessagePayload, time: MillisecondTime) -> Self {
        Self::new(
            time,
            EventKind::Message(MessageEvent {
                tag,
                object_id: MessageTag::NONE,
                payload,
            }),
        )
    }

    pub fn number(tag: MessageTag, value: f64, time: MillisecondTime) -> Self {
        Self::message(tag, MessagePayload::Number(value), time)
    }

    pub fn list(tag: MessageTag, values: Vec<f64>, time: MillisecondTime) -> Self {
        Self::message(tag, MessagePayload::List(values), time)
    }

    pub fn bang(tag: MessageTag, time: MillisecondTime) -> Self {
        Self::message(tag, MessagePayload::Bang, time)
    }

    pub fn clock(
        target: EventTarget,
        clock_id: ClockId,
        value: Option<f64>,
        time: MillisecondTime,
    ) -> Self {
        Self::new(time, EventKind::Clock(ClockEvent { clock_id, value })).with_target(target)
    }

    pub fn transport(state: TransportState, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::Transport(state))
    }

    pub fn tempo(bpm: f64, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::Tempo(bpm))
    }

    pub fn beat_time(beats: f64, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::BeatTime(beats))
    }

    pub fn time_signature(numerator: u32, denominator: u32, time: MillisecondTime) -> Self {
        Self::new(
            time,
            EventKind::TimeSignature(TimeSignature {
                numerator,
                denominator,
            }),
        )
    }

    pub fn data_ref_updated(index: usize, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::DataRefUpdated(index))
    }

    pub fn outlet(index: usize, value: f64, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::OutletValue(OutletEvent { index, value }))
    }

    pub fn startup(phase: StartupPhase, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::Startup(phase))
    }

    pub fn preset_get(callback: PresetCallback, time: MillisecondTime) -> Self {
        Self::new(
            time,
            EventKind::Preset(PresetEvent {
                kind: PresetEventKind::Get,
                preset: None,
                callback: Some(callback),
            }),
        )
    }

    pub fn preset_set(
        preset: Arc<Preset>,
        callback: Option<PresetCallback>,
        time: MillisecondTime,
    ) -> Self {
        Self::new(
            time,
            EventKind::Preset(PresetEvent {
                kind: PresetEventKind::Set,
                preset: Some(preset),
                callback,
            }),
        )
    }

    pub fn preset_notification(kind: PresetEventKind, time: MillisecondTime) -> Self {
        Self::new(time, EventKind::Preset(PresetEvent::notification(kind)))
    }

    pub fn with_target(mut self, target: EventTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Tag a parameter or MIDI-free event with the interface it originated from.
    /// Only parameter events carry a source; other kinds are returned unchanged.
    pub fn with_source(mut self, source: InterfaceId) -> Self {
        if let EventKind::Parameter(ref mut p) = self.kind {
            p.source = Some(source);
        }
        self
    }

    #[inline]
    pub fn time(&self) -> MillisecondTime {
        self.time
    }

    #[inline]
    pub fn set_time(&mut self, time: MillisecondTime) {
        self.time = time;
    }

    #[inline]
    pub fn target(&self) -> Option<EventTarget> {
        self.target
    }

    #[inline]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn into_kind(self) -> EventKind {
        self.kind
    }

    /// Source interface of a parameter event.
    pub fn source(&self) -> Option<InterfaceId> {
        match self.kind {
            EventKind::Parameter(p) => p.source,
            _ => None,
        }
    }

    /// Clock id if this is a clock event addressed to `target`.
    #[inline]
    pub fn clock_key(&self) -> Option<(Option<EventTarget>, ClockId)> {
        match self.kind {
            EventKind::Clock(c) => Some((self.target, c.clock_id)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_clock_for(&self, target: Option<EventTarget>, clock_id: ClockId) -> bool {
        self.clock_key() == Some((target, clock_id))
    }
}
