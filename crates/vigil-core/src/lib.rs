//! Vigil Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every Vigil component:
//! - Presence and session state (ExpressionState, ModelReadiness, SessionConnectionState)
//! - Media handles (MediaSource, VideoFrame, CaptureStream)
//! - Typed publish/subscribe (EventBus, Subscription)
//! - Cancellable, generation-stamped timers (TimerSlot)
//! - The shared error type

pub mod error;
pub mod event;
pub mod media;
pub mod state;
pub mod timer;

pub use error::*;
pub use event::*;
pub use media::*;
pub use state::*;
pub use timer::*;
