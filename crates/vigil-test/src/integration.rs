//! End-to-end scenarios
//!
//! Drives a full `Controller` over scripted collaborators on paused tokio
//! time:
//! - Session lifecycle with presence-driven disconnect and reconnect
//! - Model and device failures
//! - Teardown ordering
//! - Seeded soak runs

use std::sync::Arc;
use std::time::Duration;

use vigil_core::VigilResult;
use vigil_media::VideoSink;
use vigil_runtime::{Collaborators, Controller, RuntimeConfig, UserProfile};

use crate::{
    FakeCamera, FakeIdentity, FakeMicrophone, FakeSpeaker, FakeTransport, PresenceSimulator,
    Scene, SceneModel, Span,
};

/// A controller plus handles on every fake behind it
pub struct Harness {
    pub model: Arc<SceneModel>,
    pub camera: Arc<FakeCamera>,
    pub microphone: Arc<FakeMicrophone>,
    pub transport: Arc<FakeTransport>,
    pub speaker: Arc<FakeSpeaker>,
    pub identity: Arc<FakeIdentity>,
    pub controller: Controller,
}

impl Harness {
    pub fn new(config: RuntimeConfig) -> VigilResult<Self> {
        Self::with_model(SceneModel::new(), config)
    }

    pub fn with_model(model: SceneModel, config: RuntimeConfig) -> VigilResult<Self> {
        let model = Arc::new(model);
        let camera = Arc::new(FakeCamera::default());
        let microphone = Arc::new(FakeMicrophone::default());
        let transport = Arc::new(FakeTransport::default());
        let speaker = Arc::new(FakeSpeaker::default());
        let identity = Arc::new(FakeIdentity::default());

        let controller = Controller::new(
            Collaborators {
                model: model.clone(),
                camera: camera.clone(),
                microphone: microphone.clone(),
                transport: transport.clone(),
                audio: speaker.clone(),
                identity: identity.clone(),
            },
            config,
        )?;

        Ok(Harness {
            model,
            camera,
            microphone,
            transport,
            speaker,
            identity,
            controller,
        })
    }

    /// Boot, sign in, start camera and microphone, start the session
    pub async fn live_session(&self) -> VigilResult<()> {
        self.controller.boot().await;
        self.identity
            .sign_in(UserProfile::new("u-1").with_name("Aiko"), Some("token-1"));
        self.controller.media().start_camera().await?;
        self.controller.meter().start_recording().await?;
        self.controller.orchestrator().start_session().await
    }

    /// Play a timeline against the camera
    pub async fn play(&self, timeline: &[Span], sim: &mut PresenceSimulator) {
        for span in timeline {
            self.model.set_scene(span.scene);
            let Scene::Face(_) = span.scene else {
                tokio::time::sleep(span.duration).await;
                continue;
            };

            // Glitches are kept away from the first seconds of a return so
            // the face is always seen promptly
            let mut elapsed = Duration::ZERO;
            while elapsed < span.duration {
                let step = Duration::from_secs(1).min(span.duration - elapsed);
                if elapsed >= Duration::from_secs(3) && sim.glitch() {
                    self.model.set_scene(Scene::Glitch);
                } else {
                    self.model.set_scene(span.scene);
                }
                tokio::time::sleep(step).await;
                elapsed += step;
            }
        }
    }
}

/// Register a recording sink, keeping the concrete handle for assertions
pub fn sink(harness: &Harness) -> (Arc<crate::RecordingSink>, Arc<dyn VideoSink>) {
    let concrete = Arc::new(crate::RecordingSink::default());
    let erased: Arc<dyn VideoSink> = concrete.clone();
    harness.controller.media().register_sink(&erased);
    (concrete, erased)
}
