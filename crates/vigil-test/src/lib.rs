//! Vigil Test Harness - scripted collaborators and scenario testing
//!
//! This crate provides:
//! - Fakes for every platform collaborator
//! - A seeded presence simulator for soak runs
//! - End-to-end scenarios over the full controller

pub mod fakes;
pub mod integration;
pub mod simulator;

pub use fakes::*;
pub use integration::*;
pub use simulator::*;
