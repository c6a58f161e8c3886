//! Vigil Voice - microphone level metering
//!
//! This crate provides:
//! - The microphone collaborator (`Microphone`)
//! - A pure noise-gated throttle for raw loudness samples
//! - The level meter that publishes throttled `VolumeSample`s while recording

pub mod meter;
pub mod throttle;

pub use meter::*;
pub use throttle::*;
