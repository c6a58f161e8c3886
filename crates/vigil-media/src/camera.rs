//! Camera device collaborator

use async_trait::async_trait;
use vigil_core::{CaptureConstraints, MediaSource, VigilResult};

/// Platform camera access
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Acquire a live stream. Fails with `PermissionDenied` or
    /// `DeviceUnavailable`.
    async fn acquire(&self, constraints: &CaptureConstraints) -> VigilResult<MediaSource>;

    /// Give the device back. Called exactly once per successful acquire,
    /// after the stream's tracks have been stopped.
    fn release(&self, source: &MediaSource);
}
