//! Level meter
//!
//! Subscribes to the microphone's raw loudness while recording and
//! publishes throttled samples on a watch channel. Stopping resets the
//! published volume to zero and removes the sample subscription.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use vigil_core::{Subscription, VigilError, VigilResult, VolumeSample};

use crate::{MeterConfig, VolumeThrottle};

/// Raw loudness callback, values nominally in [0, 1]
pub type VolumeHandler = Box<dyn Fn(f32) + Send + Sync>;

/// Platform microphone access
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Begin capture. Fails with `MicrophoneUnavailable` when permission
    /// is refused or no device exists.
    async fn start(&self) -> VigilResult<()>;

    fn stop(&self);

    /// Receive raw loudness samples until the subscription is dropped
    fn subscribe_volume(&self, handler: VolumeHandler) -> Subscription;
}

struct MeterState {
    /// Bumped on every start/stop; samples from an older session are dropped
    session: u64,
    starting: bool,
    recording: bool,
    throttle: VolumeThrottle,
    subscription: Option<Subscription>,
    last_error: Option<VigilError>,
}

struct MeterInner {
    volume: watch::Sender<VolumeSample>,
    state: Mutex<MeterState>,
}

impl MeterInner {
    fn on_sample(&self, session: u64, raw: f32) {
        let mut state = self.state.lock();
        if state.session != session || !(state.recording || state.starting) {
            return;
        }
        if let Some(sample) = state.throttle.offer(raw) {
            self.volume.send_if_modified(|v| {
                let changed = *v != sample;
                *v = sample;
                changed
            });
        }
    }
}

/// Microphone volume meter
pub struct LevelMeter {
    microphone: Arc<dyn Microphone>,
    inner: Arc<MeterInner>,
}

impl LevelMeter {
    pub fn new(microphone: Arc<dyn Microphone>, config: MeterConfig) -> Self {
        let (volume, _) = watch::channel(VolumeSample::ZERO);
        LevelMeter {
            microphone,
            inner: Arc::new(MeterInner {
                volume,
                state: Mutex::new(MeterState {
                    session: 0,
                    starting: false,
                    recording: false,
                    throttle: VolumeThrottle::new(config),
                    subscription: None,
                    last_error: None,
                }),
            }),
        }
    }

    /// Subscribe to loudness and start the microphone.
    ///
    /// No-op while already recording or starting. On failure the
    /// subscription is removed and a retryable message is kept.
    pub async fn start_recording(&self) -> VigilResult<()> {
        let session = {
            let mut state = self.inner.state.lock();
            if state.recording || state.starting {
                return Ok(());
            }
            state.session += 1;
            state.starting = true;
            state.throttle.reset();
            state.session
        };

        let weak = Arc::downgrade(&self.inner);
        let subscription = self.microphone.subscribe_volume(Box::new(move |raw| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sample(session, raw);
            }
        }));
        {
            let mut state = self.inner.state.lock();
            if state.session != session {
                return Ok(());
            }
            state.subscription = Some(subscription);
        }

        let result = self.microphone.start().await;

        let mut state = self.inner.state.lock();
        if state.session != session {
            // stop_recording ran while the device was starting
            drop(state);
            if result.is_ok() {
                self.microphone.stop();
            }
            return Ok(());
        }
        state.starting = false;

        match result {
            Ok(()) => {
                state.recording = true;
                state.last_error = None;
                tracing::info!("microphone recording");
                Ok(())
            }
            Err(e) => {
                let subscription = state.subscription.take();
                state.last_error = Some(e.clone());
                drop(state);
                drop(subscription);
                tracing::warn!(error = %e, "microphone start failed");
                Err(e)
            }
        }
    }

    /// Stop the microphone, drop the sample subscription and reset the
    /// published volume to zero.
    pub fn stop_recording(&self) {
        let (subscription, was_recording) = {
            let mut state = self.inner.state.lock();
            // A start still in flight stops the device itself once it settles
            let was_recording = state.recording;
            state.session += 1;
            state.recording = false;
            state.starting = false;
            state.throttle.reset();
            self.inner.volume.send_if_modified(|v| {
                let changed = *v != VolumeSample::ZERO;
                *v = VolumeSample::ZERO;
                changed
            });
            (state.subscription.take(), was_recording)
        };

        drop(subscription);
        if was_recording {
            self.microphone.stop();
            tracing::info!("microphone stopped");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state.lock().recording
    }

    pub fn volume(&self) -> VolumeSample {
        *self.inner.volume.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VolumeSample> {
        self.inner.volume.subscribe()
    }

    /// Last start failure, for display
    pub fn last_error(&self) -> Option<VigilError> {
        self.inner.state.lock().last_error.clone()
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        self.stop_recording();
    }
}
