//! Media handles shared between capture, fan-out and inference
//!
//! A `MediaSource` wraps one acquired camera stream. Cloning the handle
//! shares the stream; it never re-acquires the device.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one device acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaSourceId(pub u64);

impl MediaSourceId {
    fn next() -> Self {
        MediaSourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MediaSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media-{}", self.0)
    }
}

/// One decoded camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Frame counter within the stream
    pub sequence: u64,
    /// Pixel data (RGBA)
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, sequence: u64, data: Bytes) -> Self {
        VideoFrame {
            width,
            height,
            sequence,
            data,
        }
    }
}

/// Live stream produced by a camera device
pub trait CaptureStream: Send + Sync {
    /// Most recent frame, if the stream has produced one yet
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Stop every underlying device track
    fn stop_tracks(&self);

    /// True until the tracks are stopped
    fn is_live(&self) -> bool;
}

/// Handle to the single acquired camera stream
#[derive(Clone)]
pub struct MediaSource {
    id: MediaSourceId,
    stream: Arc<dyn CaptureStream>,
}

impl MediaSource {
    /// Wrap a freshly acquired stream. Every call yields a new id.
    pub fn new(stream: Arc<dyn CaptureStream>) -> Self {
        MediaSource {
            id: MediaSourceId::next(),
            stream,
        }
    }

    pub fn id(&self) -> MediaSourceId {
        self.id
    }

    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.stream.latest_frame()
    }

    pub fn stop_tracks(&self) {
        self.stream.stop_tracks();
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_live()
    }
}

impl PartialEq for MediaSource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaSource {}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("id", &self.id)
            .field("live", &self.stream.is_live())
            .finish()
    }
}

/// Which camera to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Constraints passed to the camera on acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    /// Ideal frame width
    pub ideal_width: u32,
    /// Ideal frame height
    pub ideal_height: u32,
    pub facing: FacingMode,
    /// Request an audio track alongside video
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        CaptureConstraints {
            ideal_width: 640,
            ideal_height: 480,
            facing: FacingMode::User,
            audio: false,
        }
    }
}
