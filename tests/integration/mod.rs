//! Integration test modules for cadenza
//!
//! - engine: lifecycle, block processing and dispatch
//! - hot_swap: patch replacement while processing
//! - interfaces: sync, trigger and async parameter interfaces
//! - presets: preset snapshot and restore

pub mod engine;
pub mod hot_swap;
pub mod interfaces;
pub mod presets;
