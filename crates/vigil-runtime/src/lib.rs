//! Vigil Runtime - presence-driven session control
//!
//! This crate wires the services together:
//! 1. Load the expression model once
//! 2. Stream the camera to display sinks and the inference loop
//! 3. Meter the microphone
//! 4. Turn presence edges into connect/disconnect decisions
//! 5. Tear everything down in a fixed order

pub mod config;
pub mod controller;
pub mod identity;
pub mod logging;
pub mod orchestrator;
pub mod policy;

pub use config::*;
pub use controller::*;
pub use identity::*;
pub use logging::*;
pub use orchestrator::*;
pub use policy::*;
