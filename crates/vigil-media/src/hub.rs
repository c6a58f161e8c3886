//! Media hub - single camera acquisition fanned out to every consumer
//!
//! The hub is the only component that acquires or releases the camera.
//! Sink registration never touches the device.
//!
//! INVARIANT: at every observation point, every registered sink shows the
//! current source (or nothing when not streaming).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use vigil_core::{CaptureConstraints, MediaSource, VigilError, VigilResult};
use vigil_vision::{InferenceLoop, ModelGate};

use crate::{CameraDevice, SinkRegistry, VideoSink};

#[derive(Default)]
struct HubState {
    source: Option<MediaSource>,
    sinks: SinkRegistry,
    /// Attempt id of the acquisition in flight, if any
    acquiring: Option<u64>,
    attempts: u64,
    last_error: Option<VigilError>,
}

/// Camera fan-out manager
pub struct MediaHub {
    camera: Arc<dyn CameraDevice>,
    gate: Arc<ModelGate>,
    inference: Arc<InferenceLoop>,
    constraints: CaptureConstraints,
    state: Mutex<HubState>,
    streaming: watch::Sender<bool>,
}

impl MediaHub {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        gate: Arc<ModelGate>,
        inference: Arc<InferenceLoop>,
        constraints: CaptureConstraints,
    ) -> Self {
        let (streaming, _) = watch::channel(false);
        MediaHub {
            camera,
            gate,
            inference,
            constraints,
            state: Mutex::new(HubState::default()),
            streaming,
        }
    }

    /// Acquire the camera and start feeding sinks and inference.
    ///
    /// No-op when already streaming or acquiring. On failure the hub stays
    /// not streaming and the user-facing error is kept for display.
    pub async fn start_camera(&self) -> VigilResult<()> {
        let attempt = {
            let mut state = self.state.lock();
            if let Err(e) = self.gate.ensure_loaded() {
                tracing::warn!(error = %e, "camera start refused");
                state.last_error = Some(e.clone());
                return Err(e);
            }
            if state.source.is_some() || state.acquiring.is_some() {
                return Ok(());
            }
            state.attempts += 1;
            state.acquiring = Some(state.attempts);
            state.attempts
        };

        let acquired = self.camera.acquire(&self.constraints).await;

        let mut state = self.state.lock();
        let current = state.acquiring == Some(attempt);
        if current {
            state.acquiring = None;
        }

        let source = match acquired {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, "camera acquisition failed");
                if current {
                    state.last_error = Some(e.clone());
                }
                return Err(e);
            }
        };

        if !current {
            // stop_camera ran while we were waiting on the device
            drop(state);
            tracing::info!(source = %source.id(), "releasing camera acquired after stop");
            source.stop_tracks();
            self.camera.release(&source);
            return Ok(());
        }

        state
            .sinks
            .for_each_live(|sink| sink.set_source(Some(source.clone())));
        state.source = Some(source.clone());
        state.last_error = None;
        self.streaming.send_replace(true);
        tracing::info!(source = %source.id(), sinks = state.sinks.len(), "camera streaming");

        if let Err(e) = self.inference.start(source) {
            tracing::warn!(error = %e, "inference did not start with camera");
        }
        Ok(())
    }

    /// Stop every track, clear every sink, release the device and stop
    /// inference. Also abandons an acquisition still in flight.
    pub fn stop_camera(&self) {
        let mut state = self.state.lock();
        state.acquiring = None;

        let Some(source) = state.source.take() else {
            return;
        };

        source.stop_tracks();
        self.camera.release(&source);
        state.sinks.for_each_live(|sink| sink.set_source(None));
        self.streaming.send_replace(false);
        self.inference.stop();
        tracing::info!(source = %source.id(), "camera stopped");
    }

    /// Add a display sink. It receives the current source immediately.
    pub fn register_sink(&self, sink: &Arc<dyn VideoSink>) {
        let mut state = self.state.lock();
        if !state.sinks.insert(sink) {
            return;
        }
        if let Some(source) = &state.source {
            sink.set_source(Some(source.clone()));
        }
        tracing::debug!(sinks = state.sinks.len(), "sink registered");
    }

    /// Remove a display sink and clear its surface. Other sinks and the
    /// device are unaffected.
    pub fn unregister_sink(&self, sink: &Arc<dyn VideoSink>) {
        let mut state = self.state.lock();
        sink.set_source(None);
        if state.sinks.remove(sink) {
            tracing::debug!(sinks = state.sinks.len(), "sink unregistered");
        }
    }

    pub fn is_streaming(&self) -> bool {
        *self.streaming.borrow()
    }

    pub fn subscribe_streaming(&self) -> watch::Receiver<bool> {
        self.streaming.subscribe()
    }

    pub fn current_source(&self) -> Option<MediaSource> {
        self.state.lock().source.clone()
    }

    pub fn sink_count(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Last user-facing failure of `start_camera`
    pub fn last_error(&self) -> Option<VigilError> {
        self.state.lock().last_error.clone()
    }

    pub fn inference(&self) -> &Arc<InferenceLoop> {
        &self.inference
    }
}

impl Drop for MediaHub {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
