//! Centralized error type for the cadenza umbrella crate.
//!
//! Wraps the core error so `?` propagates naturally across crate boundaries.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error("Timed out after {0:?} waiting for the audio thread to release the engine")]
    LockTimeout(Duration),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown data reference: {0}")]
    UnknownDataRef(String),

    #[error("Too many parameter interfaces (limit {0})")]
    TooManyInterfaces(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
