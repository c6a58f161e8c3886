//! Vigil Transport - realtime session plumbing
//!
//! This crate provides:
//! - Wire-facing message parts and inbound transport events
//! - The realtime transport and audio output collaborators
//! - The connection lifecycle manager with connect/disconnect timestamps,
//!   attempt generations and an inbound event relay

pub mod manager;
pub mod message;
pub mod transport;

pub use manager::*;
pub use message::*;
pub use transport::*;
