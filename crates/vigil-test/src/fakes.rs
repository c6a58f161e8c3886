//! Scripted collaborators
//!
//! Each fake counts the calls made on it so scenarios can assert exactly
//! how often a device was acquired, a session opened, and so on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use vigil_core::{
    CaptureConstraints, CaptureStream, EventBus, ExpressionState, MediaSource, MediaSourceId,
    Subscription, VideoFrame, VigilError, VigilResult,
};
use vigil_media::{CameraDevice, VideoSink};
use vigil_runtime::{IdentityProvider, UserProfile};
use vigil_transport::{
    AudioOutput, Credential, Part, RealtimeTransport, TransportEvent, TransportHandler,
};
use vigil_vision::{ExpressionModel, ExpressionScore};
use vigil_voice::{Microphone, VolumeHandler};

/// What the camera currently sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Face(ExpressionState),
    Empty,
    /// Inference throws on this frame
    Glitch,
}

// ============================================================================
// MODEL
// ============================================================================

/// Expression model that reports whatever scene is set
pub struct SceneModel {
    scene: Mutex<Scene>,
    fail_load: AtomicBool,
    loads: AtomicUsize,
    calls: AtomicUsize,
}

impl SceneModel {
    pub fn new() -> Self {
        SceneModel {
            scene: Mutex::new(Scene::Face(ExpressionState::Neutral)),
            fail_load: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        let model = Self::new();
        model.fail_load.store(true, Ordering::SeqCst);
        model
    }

    pub fn set_scene(&self, scene: Scene) {
        *self.scene.lock() = scene;
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for SceneModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpressionModel for SceneModel {
    async fn load(&self) -> VigilResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(VigilError::ModelLoadFailed("weights missing".into()));
        }
        Ok(())
    }

    async fn infer(&self, _frame: &VideoFrame) -> VigilResult<Option<Vec<ExpressionScore>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scene = *self.scene.lock();
        match scene {
            Scene::Face(state) => Ok(Some(vec![
                ExpressionScore::new(ExpressionState::Neutral, 0.2),
                ExpressionScore::new(state, 0.7),
            ])),
            Scene::Empty => Ok(None),
            Scene::Glitch => Err(VigilError::Inference("tensor shape mismatch".into())),
        }
    }
}

// ============================================================================
// CAMERA
// ============================================================================

pub struct FakeStream {
    live: AtomicBool,
    sequence: AtomicU64,
}

impl CaptureStream for FakeStream {
    fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        Some(VideoFrame::new(640, 480, seq, Bytes::from_static(&[0u8; 64])))
    }

    fn stop_tracks(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeCamera {
    deny: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl FakeCamera {
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn acquire(&self, _constraints: &CaptureConstraints) -> VigilResult<MediaSource> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VigilError::PermissionDenied("camera blocked".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MediaSource::new(Arc::new(FakeStream {
            live: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
        })))
    }

    fn release(&self, _source: &MediaSource) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Display sink that remembers what it shows
#[derive(Default)]
pub struct RecordingSink {
    mounted: Mutex<Option<MediaSourceId>>,
    updates: AtomicUsize,
}

impl RecordingSink {
    pub fn shows(&self) -> Option<MediaSourceId> {
        *self.mounted.lock()
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl VideoSink for RecordingSink {
    fn set_source(&self, source: Option<MediaSource>) {
        *self.mounted.lock() = source.map(|s| s.id());
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// MICROPHONE
// ============================================================================

#[derive(Default)]
pub struct FakeMicrophone {
    levels: EventBus<f32>,
    deny: AtomicBool,
    running: AtomicBool,
}

impl FakeMicrophone {
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Emit a raw loudness sample to subscribers
    pub fn level(&self, raw: f32) {
        self.levels.emit(&raw);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribers(&self) -> usize {
        self.levels.subscriber_count()
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn start(&self) -> VigilResult<()> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VigilError::MicrophoneUnavailable("microphone blocked".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn subscribe_volume(&self, handler: VolumeHandler) -> Subscription {
        self.levels.subscribe(move |raw: &f32| handler(*raw))
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// Transport that succeeds unless a failure is queued
#[derive(Default)]
pub struct FakeTransport {
    events: EventBus<TransportEvent>,
    failures: Mutex<VecDeque<VigilError>>,
    credentials: Mutex<Vec<Option<Credential>>>,
    sent: Mutex<Vec<Part>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeTransport {
    pub fn fail_next(&self, error: VigilError) {
        self.failures.lock().push_back(error);
    }

    /// Deliver an event as if it came from the remote side
    pub fn remote(&self, event: TransportEvent) {
        self.events.emit(&event);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Part> {
        self.sent.lock().clone()
    }

    pub fn credentials(&self) -> Vec<Option<Credential>> {
        self.credentials.lock().clone()
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn open(&self, credential: Option<Credential>) -> VigilResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.credentials.lock().push(credential);
        match self.failures.lock().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.emit(&TransportEvent::Close);
    }

    fn send(&self, parts: Vec<Part>) -> VigilResult<()> {
        self.sent.lock().extend(parts);
        Ok(())
    }

    fn subscribe(&self, handler: TransportHandler) -> Subscription {
        self.events.subscribe(move |e| handler(e))
    }
}

#[derive(Default)]
pub struct FakeSpeaker {
    played: AtomicUsize,
    stops: AtomicUsize,
    levels: EventBus<f32>,
}

impl FakeSpeaker {
    /// Emit a raw playback loudness sample
    pub fn level(&self, raw: f32) {
        self.levels.emit(&raw);
    }

    pub fn played_bytes(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeSpeaker {
    fn play_pcm16(&self, data: Bytes) {
        self.played.fetch_add(data.len(), Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe_volume(&self, handler: VolumeHandler) -> Subscription {
        self.levels.subscribe(move |raw: &f32| handler(*raw))
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

#[derive(Default)]
pub struct FakeIdentity {
    user: Mutex<Option<UserProfile>>,
    token: Mutex<Option<String>>,
}

impl FakeIdentity {
    pub fn sign_in(&self, user: UserProfile, token: Option<&str>) {
        *self.user.lock() = Some(user);
        *self.token.lock() = token.map(str::to_string);
    }

    pub fn sign_out(&self) {
        *self.user.lock() = None;
        *self.token.lock() = None;
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        self.user.lock().clone()
    }

    async fn credential(&self) -> VigilResult<Option<Credential>> {
        Ok(self.token.lock().as_deref().map(Credential::new))
    }
}
