//! Vigil Media - one camera, many consumers
//!
//! This crate provides:
//! - The camera device collaborator (`CameraDevice`)
//! - Weak, non-owning display sinks (`VideoSink`, `SinkRegistry`)
//! - The fan-out hub that acquires the camera once and feeds every sink
//!   plus the inference loop (`MediaHub`)

pub mod camera;
pub mod hub;
pub mod sink;

pub use camera::*;
pub use hub::*;
pub use sink::*;
