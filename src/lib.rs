//! # Cadenza - Sample-accurate Event Engine
//!
//! Drives a hot-swappable patch from a real-time audio callback while other threads
//! schedule events, exchange presets and observe parameters.
//!
//! ## Architecture
//!
//! - **cadenza-core** - single-threaded runtime (events, scheduler, presets, DataRef, `EngineCore`)
//! - **cadenza** - thread-safe [`Engine`] with patch hot swap, external data and
//!   parameter interfaces
//!
//! ## Quick Start
//!
//! ```
//! use cadenza::prelude::*;
//!
//! let engine = Engine::builder()
//!     .sample_rate(48000.0)
//!     .max_block_size(512)
//!     .patcher(Box::new(NullPatcher))
//!     .build()?;
//!
//! // Control thread
//! let params = engine.create_parameter_interface(InterfaceKind::default(), Box::new(NullHandler))?;
//! params.send_midi(0, &[0x90, 60, 100], 0.0)?;
//!
//! // Audio thread
//! let mut left = vec![0.0f32; 512];
//! let mut outputs = [left.as_mut_slice()];
//! engine.process(&[], &mut outputs, 512, None, None);
//!
//! // Back on the control thread
//! params.drain_events();
//! # Ok::<(), cadenza::Error>(())
//! ```

/// Re-export of cadenza-core for direct access
pub use cadenza_core as core;

pub use cadenza_core::{
    // Events
    ClockEvent,
    ClockId,
    // DataRef
    DataRef,
    DataType,
    ElementType,
    EngineContext,
    Event,
    EventKind,
    EventTarget,
    InterfaceId,
    MessageEvent,
    MessagePayload,
    MessageTag,
    MidiEvent,
    MillisecondTime,
    // Patch contract
    NullPatcher,
    OutletEvent,
    ParameterEvent,
    ParameterIndex,
    // Parameters
    ParameterInfo,
    ParameterTable,
    ParameterType,
    Patcher,
    // State
    PatcherState,
    Preset,
    PresetCallback,
    PresetEvent,
    PresetEventKind,
    QueueMode,
    StartupPhase,
    TimeSignature,
    TimedMidiEvent,
    TransportState,
    Value,
};

pub use cadenza_core::{preset_from_json, preset_from_str, preset_to_json, preset_to_string};

mod builder;
mod config;
mod control;
mod engine;
mod error;
mod external_data;
pub mod interface;
mod swap;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use external_data::ReleaseCallback;
pub use interface::{
    AsyncInterface, EventHandler, InterfaceKind, NullHandler, ParameterEventInterface,
    SyncInterface, TriggerInterface,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Engine, EngineBuilder, EngineConfig, Error, Result};

    pub use crate::{
        AsyncInterface, EventHandler, InterfaceKind, NullHandler, ParameterEventInterface,
        SyncInterface, TriggerInterface,
    };

    pub use crate::{
        EngineContext, Event, EventKind, MessagePayload, MessageTag, MidiEvent, NullPatcher,
        ParameterInfo, Patcher, Preset, QueueMode, TimedMidiEvent,
    };
}
