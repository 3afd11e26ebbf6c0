//! Event runtime kernel for a sample-accurate patch engine.
//!
//! # Primary API
//!
//! - [`EngineCore`]: single-threaded engine driving one [`Patcher`]
//! - [`Event`] / [`EventKind`]: everything the engine delivers to a patch
//! - [`Scheduler`] / [`EventSequence`]: time-ordered event storage
//! - [`PatcherState`] / [`Preset`]: state tree with a JSON round trip
//! - [`DataRef`]: named external buffers with negotiated size
//! - [`EventQueue`] / [`ShadowValues`]: lock-free plumbing for parameter interfaces
//!
//! # Example
//!
//! ```
//! use cadenza_core::{EngineCore, Event, NullPatcher};
//!
//! let mut core = EngineCore::new();
//! core.prepare_to_process(48000.0, 512)?;
//! core.set_patcher(Box::new(NullPatcher));
//! core.schedule_event(Event::tempo(120.0, 0.0));
//!
//! let mut left = vec![0.0f32; 512];
//! let mut outputs = [left.as_mut_slice()];
//! core.process(&[], &mut outputs, 512, None, None);
//! # Ok::<(), cadenza_core::Error>(())
//! ```

#[macro_use]
mod macros;

#[doc(hidden)]
pub use tracing;

pub mod error;
pub use error::{Error, Result};

pub mod event;
pub use event::{
    ClockEvent, ClockId, Event, EventKind, EventTarget, InterfaceId, MessageEvent,
    MessagePayload, MessageTag, MidiEvent, MillisecondTime, OutletEvent, ParameterEvent,
    ParameterIndex, PresetCallback, PresetEvent, PresetEventKind, StartupPhase, TimeSignature,
    TimedMidiEvent, TransportState,
};

pub mod sequence;
pub use sequence::EventSequence;

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod queue;
pub use queue::{EventQueue, QueueMode, DEFAULT_QUEUE_CAPACITY};

pub mod lockfree;
pub use lockfree::{AtomicValue, ShadowValues};

pub mod parameter;
pub use parameter::{ParameterEntry, ParameterInfo, ParameterTable, ParameterType};

pub mod state;
pub use state::{PatcherState, Preset, Value};

pub mod preset;
pub use preset::{
    preset_from_json, preset_from_str, preset_to_json, preset_to_string, PRESET_ID, PRESET_ID_KEY,
};

pub mod dataref;
pub use dataref::{
    AllocationOutcome, AudioBufferView, AudioBufferViewMut, DataRef, DataType, ElementType,
};

pub mod patcher;
pub use patcher::{data_ref_index, NullPatcher, Patcher};

mod context;
pub use context::EngineContext;

pub mod endpoint;
pub use endpoint::{InterfaceEndpoint, ServiceNotification};

mod engine_core;
pub use engine_core::{EngineCore, DEFAULT_EVENT_CAPACITY};
