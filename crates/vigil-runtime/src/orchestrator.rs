//! Session orchestrator
//!
//! Watches the published expression, turns presence edges into policy
//! decisions and carries them out against the connection manager. Owns the
//! single disappearance timer.
//!
//! INVARIANT: a disappearance timer that has been cancelled or superseded
//! never disconnects. Cancellation and the timer's claim both happen under
//! the orchestrator lock. The lock is never held across a call into the
//! connection manager, whose event handlers may read orchestrator state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_core::{ExpressionState, Presence, TimerSlot, TimerToken, VigilError, VigilResult};
use vigil_transport::{ConnectionManager, Credential, Part};
use vigil_voice::LevelMeter;

use crate::{
    IdentityProvider, PolicyAction, PolicyConfig, PresenceEdge, PresencePolicy, SessionFacts,
    UserProfile,
};

struct OrchState {
    /// Set by the first successful manual start
    started: bool,
    presence: Presence,
    disappear: TimerSlot,
    pump: Option<JoinHandle<()>>,
    /// Credential from the manual start, reused for automatic reconnects
    credential: Option<Credential>,
}

struct OrchInner {
    connection: Arc<ConnectionManager>,
    meter: Arc<LevelMeter>,
    identity: Arc<dyn IdentityProvider>,
    policy: PresencePolicy,
    config: PolicyConfig,
    state: Mutex<OrchState>,
}

impl OrchInner {
    async fn observe(self: &Arc<Self>, value: Option<ExpressionState>) {
        let credential = {
            let mut st = self.state.lock();
            let next = match value {
                None => {
                    st.presence = Presence::Unknown;
                    return;
                }
                // A failed cycle says nothing about the face
                Some(ExpressionState::Error) => return,
                Some(state) => state.presence(),
            };
            let Some(edge) = PresenceEdge::between(st.presence, next) else {
                return;
            };
            st.presence = next;

            let facts = SessionFacts {
                started: st.started,
                connection: self.connection.state(),
                disconnected_for: self.connection.disconnection_duration(),
            };
            let action = self.policy.decide(edge, facts);
            tracing::debug!(?edge, ?action, connection = %facts.connection, "presence edge");

            match action {
                PolicyAction::Ignore => return,
                PolicyAction::CancelDisconnect => {
                    if st.disappear.cancel() {
                        tracing::info!("face returned, pending disconnect cancelled");
                    }
                    return;
                }
                PolicyAction::ScheduleDisconnect => {
                    self.schedule_disconnect(&mut st);
                    return;
                }
                PolicyAction::Connect => {
                    st.disappear.cancel();
                    tracing::info!(
                        down_for = ?facts.disconnected_for,
                        "face returned after a long absence, reconnecting"
                    );
                    st.credential.clone()
                }
            }
        };

        if let Err(e) = self.connection.connect(credential).await {
            tracing::warn!(error = %e, "automatic reconnect failed");
        }
    }

    fn schedule_disconnect(self: &Arc<Self>, st: &mut OrchState) {
        if st.disappear.is_armed() {
            tracing::debug!("disappearance timer already pending");
            return;
        }

        let token = st.disappear.arm();
        let grace = self.config.disappear_grace;
        let weak: Weak<OrchInner> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_disappearance(token);
            }
        });
        st.disappear.attach(token, handle);
        tracing::info!(?grace, "face lost, disconnect scheduled");
    }

    fn fire_disappearance(&self, token: TimerToken) {
        if !self.state.lock().disappear.claim(token) {
            return;
        }
        if self.connection.is_connected() {
            tracing::info!("face absent past grace period, disconnecting");
            self.connection.disconnect();
        }
    }
}

/// Presence-driven connect/disconnect controller
pub struct SessionOrchestrator {
    inner: Arc<OrchInner>,
}

impl SessionOrchestrator {
    pub fn new(
        connection: Arc<ConnectionManager>,
        meter: Arc<LevelMeter>,
        identity: Arc<dyn IdentityProvider>,
        config: PolicyConfig,
    ) -> Self {
        SessionOrchestrator {
            inner: Arc::new(OrchInner {
                connection,
                meter,
                identity,
                policy: PresencePolicy::new(&config),
                config,
                state: Mutex::new(OrchState {
                    started: false,
                    presence: Presence::Unknown,
                    disappear: TimerSlot::new(),
                    pump: None,
                    credential: None,
                }),
            }),
        }
    }

    /// Follow an expression stream. Replaces a previously attached one.
    pub fn attach(&self, mut expressions: watch::Receiver<Option<ExpressionState>>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let value = *expressions.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.observe(value).await;
                drop(inner);

                if expressions.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Some(old) = self.inner.state.lock().pump.replace(handle) {
            old.abort();
        }
    }

    /// Stop following the expression stream
    pub fn detach(&self) {
        if let Some(pump) = self.inner.state.lock().pump.take() {
            pump.abort();
        }
    }

    /// User-initiated session start.
    ///
    /// Requires a signed-in user and, unless configured otherwise, an active
    /// microphone. Connects, sends the opening context, then enables the
    /// presence policy. No-op when already connected.
    pub async fn start_session(&self) -> VigilResult<()> {
        let inner = &self.inner;
        if inner.connection.is_connected() {
            tracing::debug!("session already connected");
            return Ok(());
        }

        let user = inner.identity.current_user().ok_or(VigilError::NotSignedIn)?;
        if inner.config.require_microphone && !inner.meter.is_recording() {
            return Err(VigilError::MicrophoneInactive);
        }
        let credential = inner.identity.credential().await?;

        inner.state.lock().disappear.cancel();
        inner.connection.connect(credential.clone()).await?;

        {
            let mut st = inner.state.lock();
            st.started = true;
            st.credential = credential;
        }
        tracing::info!(user = %user.id, "session started");

        inner
            .connection
            .send(opening_context(&user, &inner.config.greeting))
    }

    /// Manual connect. Cancels a pending disappearance first.
    pub async fn connect(&self) -> VigilResult<()> {
        let credential = {
            let mut st = self.inner.state.lock();
            st.disappear.cancel();
            st.credential.clone()
        };
        self.inner.connection.connect(credential).await
    }

    /// Manual disconnect. Cancels a pending disappearance first.
    pub fn disconnect(&self) {
        self.inner.state.lock().disappear.cancel();
        self.inner.connection.disconnect();
    }

    pub fn cancel_timers(&self) {
        self.inner.state.lock().disappear.cancel();
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    pub fn presence(&self) -> Presence {
        self.inner.state.lock().presence
    }

    pub fn disappearance_pending(&self) -> bool {
        self.inner.state.lock().disappear.is_armed()
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock();
        st.disappear.cancel();
        if let Some(pump) = st.pump.take() {
            pump.abort();
        }
    }
}

/// User context block followed by the greeting prompt
pub fn opening_context(user: &UserProfile, greeting: &str) -> Vec<Part> {
    let mut lines = vec![
        "== user context ==".to_string(),
        format!("user_id: {}", user.id),
    ];
    if let Some(name) = &user.display_name {
        lines.push(format!("name: {name}"));
    }
    lines.push("== end user context ==".to_string());

    vec![Part::text(lines.join("\n")), Part::text(greeting)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vigil_core::{EventBus, SessionConnectionState, Subscription};
    use vigil_transport::{AudioOutput, RealtimeTransport, TransportEvent, TransportHandler};
    use vigil_voice::{MeterConfig, Microphone, VolumeHandler};

    #[derive(Default)]
    struct Line {
        bus: EventBus<TransportEvent>,
        opens: AtomicUsize,
        closes: AtomicUsize,
        sent: parking_lot::Mutex<Vec<Part>>,
    }

    #[async_trait]
    impl RealtimeTransport for Line {
        async fn open(&self, _credential: Option<Credential>) -> VigilResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.bus.emit(&TransportEvent::Close);
        }

        fn send(&self, parts: Vec<Part>) -> VigilResult<()> {
            self.sent.lock().extend(parts);
            Ok(())
        }

        fn subscribe(&self, handler: TransportHandler) -> Subscription {
            self.bus.subscribe(move |e| handler(e))
        }
    }

    struct Mute;

    impl AudioOutput for Mute {
        fn play_pcm16(&self, _data: Bytes) {}
        fn stop(&self) {}
    }

    struct Mic;

    #[async_trait]
    impl Microphone for Mic {
        async fn start(&self) -> VigilResult<()> {
            Ok(())
        }
        fn stop(&self) {}
        fn subscribe_volume(&self, _handler: VolumeHandler) -> Subscription {
            Subscription::empty()
        }
    }

    struct Users(Option<UserProfile>);

    #[async_trait]
    impl IdentityProvider for Users {
        fn current_user(&self) -> Option<UserProfile> {
            self.0.clone()
        }

        async fn credential(&self) -> VigilResult<Option<Credential>> {
            Ok(Some(Credential::new("token")))
        }
    }

    struct Rig {
        line: Arc<Line>,
        meter: Arc<LevelMeter>,
        connection: Arc<ConnectionManager>,
        orchestrator: SessionOrchestrator,
        face: watch::Sender<Option<ExpressionState>>,
    }

    impl Rig {
        fn new(user: Option<UserProfile>) -> Self {
            let line = Arc::new(Line::default());
            let connection = Arc::new(ConnectionManager::new(
                Arc::clone(&line) as Arc<dyn RealtimeTransport>,
                Arc::new(Mute),
            ));
            let meter = Arc::new(LevelMeter::new(Arc::new(Mic), MeterConfig::default()));
            let orchestrator = SessionOrchestrator::new(
                Arc::clone(&connection),
                Arc::clone(&meter),
                Arc::new(Users(user)),
                PolicyConfig::default(),
            );
            let (face, rx) = watch::channel(None);
            orchestrator.attach(rx);
            Rig {
                line,
                meter,
                connection,
                orchestrator,
                face,
            }
        }

        async fn started() -> Self {
            let rig = Rig::new(Some(UserProfile::new("u-1").with_name("Aiko")));
            rig.meter.start_recording().await.unwrap();
            rig.orchestrator.start_session().await.unwrap();
            rig
        }

        async fn show(&self, state: ExpressionState) {
            self.face.send_replace(Some(state));
            settle().await;
        }

        fn opens(&self) -> usize {
            self.line.opens.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.line.closes.load(Ordering::SeqCst)
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_requirements() {
        let anonymous = Rig::new(None);
        assert_eq!(
            anonymous.orchestrator.start_session().await,
            Err(VigilError::NotSignedIn)
        );

        let rig = Rig::new(Some(UserProfile::new("u-1")));
        assert_eq!(
            rig.orchestrator.start_session().await,
            Err(VigilError::MicrophoneInactive)
        );
        assert_eq!(rig.opens(), 0);
        assert!(!rig.orchestrator.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_sends_opening_context() {
        let rig = Rig::started().await;
        assert!(rig.orchestrator.is_started());
        assert!(rig.connection.is_connected());

        let sent = rig.line.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        let context = sent[0].as_text().unwrap();
        assert!(context.contains("user_id: u-1"));
        assert!(context.contains("name: Aiko"));
        assert_eq!(sent[1].as_text(), Some(PolicyConfig::default().greeting.as_str()));

        // Second start while connected does nothing
        rig.orchestrator.start_session().await.unwrap();
        assert_eq!(rig.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_ignored_before_start() {
        let rig = Rig::new(Some(UserProfile::new("u-1")));
        rig.show(ExpressionState::NoFace).await;
        rig.show(ExpressionState::Happy).await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        rig.show(ExpressionState::NoFace).await;
        rig.show(ExpressionState::Neutral).await;

        assert_eq!(rig.opens(), 0);
        assert!(!rig.orchestrator.disappearance_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_face_back_within_grace_keeps_session() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::Neutral).await;
        rig.show(ExpressionState::NoFace).await;
        assert!(rig.orchestrator.disappearance_pending());

        tokio::time::sleep(Duration::from_secs(59)).await;
        rig.show(ExpressionState::Happy).await;
        assert!(!rig.orchestrator.disappearance_pending());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(rig.closes(), 0);
        assert!(rig.connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_absence_past_grace_disconnects_once() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::NoFace).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rig.closes(), 1);
        assert_eq!(rig.connection.state(), SessionConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rig.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentering_absent_keeps_original_schedule() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::NoFace).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        rig.face.send_replace(None);
        settle().await;
        rig.show(ExpressionState::NoFace).await;

        // 60s after the first absence, not the second
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rig.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_cycle_keeps_presence() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::NoFace).await;
        rig.show(ExpressionState::Error).await;
        assert_eq!(rig.orchestrator.presence(), Presence::Absent);
        assert!(rig.orchestrator.disappearance_pending());

        rig.show(ExpressionState::Surprised).await;
        assert!(!rig.orchestrator.disappearance_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_hysteresis() {
        for (down_secs, expected_opens) in [(14 * 60 + 59, 1), (15 * 60 + 1, 2)] {
            let rig = Rig::started().await;
            rig.show(ExpressionState::NoFace).await;
            rig.orchestrator.disconnect();

            tokio::time::sleep(Duration::from_secs(down_secs)).await;
            rig.show(ExpressionState::Neutral).await;

            assert_eq!(rig.opens(), expected_opens, "down for {down_secs}s");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_disconnect_cancels_timer() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::NoFace).await;
        rig.orchestrator.disconnect();
        assert!(!rig.orchestrator.disappearance_pending());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(rig.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_connect_cancels_timer() {
        let rig = Rig::started().await;
        rig.show(ExpressionState::NoFace).await;
        rig.orchestrator.connect().await.unwrap();
        assert!(!rig.orchestrator.disappearance_pending());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rig.connection.is_connected());
        // Only the force-close of the reconnect
        assert_eq!(rig.closes(), 1);
    }

    /// Event handler that reads orchestrator state on every close
    fn watch_closes(rig: &Rig) -> (Arc<AtomicUsize>, Subscription) {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let orchestrator = Arc::downgrade(&rig.orchestrator.inner);
        let subscription = rig.connection.subscribe_events(move |event| {
            if !matches!(event, TransportEvent::Close) {
                return;
            }
            if let Some(inner) = orchestrator.upgrade() {
                let st = inner.state.lock();
                if st.started && !st.disappear.is_armed() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        (seen, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_handler_can_read_state_on_manual_disconnect() {
        let rig = Rig::started().await;
        let (seen, _sub) = watch_closes(&rig);
        rig.show(ExpressionState::NoFace).await;

        rig.orchestrator.disconnect();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(rig.orchestrator.is_started());
        assert!(!rig.orchestrator.disappearance_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_handler_can_read_state_when_timer_fires() {
        let rig = Rig::started().await;
        let (seen, _sub) = watch_closes(&rig);
        rig.show(ExpressionState::NoFace).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rig.closes(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(rig.connection.state(), SessionConnectionState::Disconnected);
    }

    #[test]
    fn test_opening_context_without_name() {
        let parts = opening_context(&UserProfile::new("u-9"), "hi");
        let context = parts[0].as_text().unwrap();
        assert!(context.contains("user_id: u-9"));
        assert!(!context.contains("name:"));
        assert_eq!(parts[1].as_text(), Some("hi"));
    }
}
