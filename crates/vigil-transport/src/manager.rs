//! Connection lifecycle
//!
//! `idle -> connecting -> connected -> disconnected -> connecting -> ...`
//! with `disconnecting` entered only by a manual `disconnect()`.
//!
//! `connected_since` is set exactly while connected. `disconnected_since`
//! is set from the moment a session ends until the next successful
//! connect. Every connect bumps an attempt generation; only the latest
//! attempt may publish its result, and `disconnect()` supersedes any
//! attempt in flight.
//!
//! Playback loudness from the audio output is throttled the same way as
//! the microphone and published as the output volume. It drops to zero
//! when playback is interrupted or the session ends.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use vigil_core::{EventBus, SessionConnectionState, Subscription, VigilResult, VolumeSample};
use vigil_voice::{MeterConfig, VolumeThrottle};

use crate::{AudioOutput, Credential, Part, RealtimeTransport, TransportEvent};

#[derive(Debug, Default)]
struct Timestamps {
    attempt: u64,
    connected_since: Option<Instant>,
    disconnected_since: Option<Instant>,
}

struct ManagerInner {
    transport: Arc<dyn RealtimeTransport>,
    audio: Arc<dyn AudioOutput>,
    clock: Mutex<Timestamps>,
    status: watch::Sender<SessionConnectionState>,
    events: EventBus<TransportEvent>,
    output_volume: watch::Sender<VolumeSample>,
    output_throttle: Mutex<VolumeThrottle>,
}

impl ManagerInner {
    fn state(&self) -> SessionConnectionState {
        *self.status.borrow()
    }

    fn set_state(&self, state: SessionConnectionState) {
        let prev = self.status.send_replace(state);
        if prev != state {
            tracing::debug!(from = %prev, to = %state, "connection state");
        }
    }

    fn mark_disconnected(&self, clock: &mut Timestamps) {
        clock.connected_since = None;
        clock.disconnected_since = Some(Instant::now());
        self.set_state(SessionConnectionState::Disconnected);
        self.silence_output();
    }

    fn on_output_level(&self, raw: f32) {
        let mut throttle = self.output_throttle.lock();
        if let Some(sample) = throttle.offer(raw) {
            self.output_volume.send_replace(sample);
        }
    }

    fn silence_output(&self) {
        self.output_throttle.lock().reset();
        self.output_volume.send_if_modified(|v| {
            let changed = *v != VolumeSample::ZERO;
            *v = VolumeSample::ZERO;
            changed
        });
    }

    fn relay(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Close => {
                let mut clock = self.clock.lock();
                // Our own force-close during connect/disconnect lands here too
                if self.state().is_connected() {
                    self.mark_disconnected(&mut clock);
                    tracing::info!("session closed by remote");
                }
            }
            TransportEvent::Interrupted => {
                self.audio.stop();
                self.silence_output();
            }
            TransportEvent::Audio(data) => self.audio.play_pcm16(data.clone()),
        }
        self.events.emit(event);
    }
}

/// Owner of the realtime session state
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
    _relay: Subscription,
    _output_meter: Subscription,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn RealtimeTransport>, audio: Arc<dyn AudioOutput>) -> Self {
        let (status, _) = watch::channel(SessionConnectionState::Idle);
        let (output_volume, _) = watch::channel(VolumeSample::ZERO);
        let inner = Arc::new(ManagerInner {
            transport,
            audio,
            clock: Mutex::new(Timestamps::default()),
            status,
            events: EventBus::new(),
            output_volume,
            output_throttle: Mutex::new(VolumeThrottle::new(MeterConfig::default())),
        });

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let relay = inner.transport.subscribe(Box::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.relay(event);
            }
        }));

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let output_meter = inner.audio.subscribe_volume(Box::new(move |raw| {
            if let Some(inner) = weak.upgrade() {
                inner.on_output_level(raw);
            }
        }));

        ConnectionManager {
            inner,
            _relay: relay,
            _output_meter: output_meter,
        }
    }

    /// Open a new session, force-closing any live one first.
    ///
    /// On failure the state rolls back: to the prior state if it was idle
    /// or disconnected, otherwise to disconnected stamped now. A result
    /// that arrives after a newer connect or a disconnect is discarded.
    pub async fn connect(&self, credential: Option<Credential>) -> VigilResult<()> {
        let (attempt, prior) = {
            let mut clock = self.inner.clock.lock();
            clock.attempt += 1;
            let prior = self.inner.state();
            if prior.is_live() {
                clock.connected_since = None;
            }
            self.inner.set_state(SessionConnectionState::Connecting);
            (clock.attempt, prior)
        };

        if prior.is_live() {
            tracing::info!(from = %prior, "closing previous session before reconnect");
            self.inner.transport.close();
        }

        let result = self.inner.transport.open(credential).await;

        let mut clock = self.inner.clock.lock();
        if clock.attempt != attempt {
            let superseded_by_disconnect = !self.inner.state().is_live();
            drop(clock);
            if result.is_ok() && superseded_by_disconnect {
                self.inner.transport.close();
            }
            tracing::debug!(attempt, "connect result discarded");
            return Ok(());
        }

        match result {
            Ok(()) => {
                clock.connected_since = Some(Instant::now());
                clock.disconnected_since = None;
                self.inner.set_state(SessionConnectionState::Connected);
                tracing::info!(attempt, "session connected");
                Ok(())
            }
            Err(e) => {
                match prior {
                    SessionConnectionState::Idle | SessionConnectionState::Disconnected => {
                        self.inner.set_state(prior)
                    }
                    _ => self.inner.mark_disconnected(&mut clock),
                }
                tracing::warn!(attempt, error = %e, "session connect failed");
                Err(e)
            }
        }
    }

    /// Close the session and stamp the disconnect time. Supersedes any
    /// connect still in flight.
    pub fn disconnect(&self) {
        {
            let mut clock = self.inner.clock.lock();
            clock.attempt += 1;
            self.inner.set_state(SessionConnectionState::Disconnecting);
        }

        self.inner.transport.close();

        let mut clock = self.inner.clock.lock();
        self.inner.mark_disconnected(&mut clock);
        tracing::info!("session disconnected");
    }

    /// Time since connect succeeded, or zero when not connected
    pub fn connection_duration(&self) -> Duration {
        let clock = self.inner.clock.lock();
        clock
            .connected_since
            .map(|since| since.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Time since the session ended, or zero when it never did or a
    /// connect has since succeeded
    pub fn disconnection_duration(&self) -> Duration {
        let clock = self.inner.clock.lock();
        clock
            .disconnected_since
            .map(|since| since.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Send a client turn. Requires a connected session.
    pub fn send(&self, parts: Vec<Part>) -> VigilResult<()> {
        if !self.inner.state().is_connected() {
            return Err(vigil_core::VigilError::NotConnected);
        }
        self.inner.transport.send(parts)
    }

    pub fn state(&self) -> SessionConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().is_connected()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionConnectionState> {
        self.inner.status.subscribe()
    }

    /// Throttled playback loudness
    pub fn output_volume(&self) -> VolumeSample {
        *self.inner.output_volume.borrow()
    }

    pub fn subscribe_output_volume(&self) -> watch::Receiver<VolumeSample> {
        self.inner.output_volume.subscribe()
    }

    /// Inbound events, after the manager has acted on them
    pub fn subscribe_events<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }
}
