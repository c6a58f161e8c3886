//! Vigil Vision - Presence from the camera
//!
//! Expression as STATE, not detections. The inference loop samples the
//! shared camera stream once per interval and publishes a single discrete
//! `ExpressionState` that downstream policy can react to.
//!
//! # Pieces
//!
//! - `expression`: classifier scores and dominant-expression selection
//! - `model`: the classifier collaborator and the process-wide load gate
//! - `inference`: the periodic, cancellable inference loop

pub mod expression;
pub mod inference;
pub mod model;

pub use expression::*;
pub use inference::*;
pub use model::*;
