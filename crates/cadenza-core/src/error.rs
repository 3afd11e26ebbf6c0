//! Error types for cadenza-core.

use thiserror::Error;

/// Error type for cadenza-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid sample rate: {0}. Must be finite and positive")]
    InvalidSampleRate(f64),

    #[error("Invalid block size: {0}. Must be non-zero")]
    InvalidBlockSize(usize),

    #[error("Invalid preset JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Preset root must be a JSON object")]
    PresetNotObject,

    #[error("Unsupported preset value for key '{key}'")]
    UnsupportedPresetValue { key: String },
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
