//! Controller - composition root
//!
//! Builds every service once from the platform collaborators and a
//! `RuntimeConfig`, and owns the teardown order:
//! timers, camera, microphone, connection, subscriptions.

use std::sync::Arc;

use vigil_core::{ModelReadiness, VigilResult};
use vigil_media::{CameraDevice, MediaHub};
use vigil_transport::{AudioOutput, ConnectionManager, RealtimeTransport};
use vigil_vision::{ExpressionModel, InferenceConfig, InferenceLoop, ModelGate};
use vigil_voice::{LevelMeter, Microphone};

use crate::{IdentityProvider, RuntimeConfig, SessionOrchestrator};

/// Platform-provided collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ExpressionModel>,
    pub camera: Arc<dyn CameraDevice>,
    pub microphone: Arc<dyn Microphone>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub audio: Arc<dyn AudioOutput>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub struct Controller {
    config: RuntimeConfig,
    model: Arc<dyn ExpressionModel>,
    gate: Arc<ModelGate>,
    inference: Arc<InferenceLoop>,
    hub: Arc<MediaHub>,
    meter: Arc<LevelMeter>,
    connection: Arc<ConnectionManager>,
    orchestrator: Arc<SessionOrchestrator>,
}

impl Controller {
    pub fn new(collaborators: Collaborators, config: RuntimeConfig) -> VigilResult<Self> {
        config.validate()?;

        let gate = Arc::new(ModelGate::new());
        let inference = Arc::new(InferenceLoop::new(
            Arc::clone(&collaborators.model),
            Arc::clone(&gate),
            InferenceConfig::from(&config.inference),
        ));
        let hub = Arc::new(MediaHub::new(
            collaborators.camera,
            Arc::clone(&gate),
            Arc::clone(&inference),
            config.camera.clone(),
        ));
        let meter = Arc::new(LevelMeter::new(collaborators.microphone, config.meter));
        let connection = Arc::new(ConnectionManager::new(
            collaborators.transport,
            collaborators.audio,
        ));
        let orchestrator = Arc::new(SessionOrchestrator::new(
            Arc::clone(&connection),
            Arc::clone(&meter),
            collaborators.identity,
            config.policy.clone(),
        ));

        Ok(Controller {
            config,
            model: collaborators.model,
            gate,
            inference,
            hub,
            meter,
            connection,
            orchestrator,
        })
    }

    /// Load the model and start following presence.
    /// A load failure is terminal and reported once.
    pub async fn boot(&self) -> ModelReadiness {
        let readiness = self.gate.load(self.model.as_ref()).await;
        self.orchestrator.attach(self.inference.subscribe());
        tracing::info!(?readiness, "controller booted");
        readiness
    }

    /// Release everything. Safe to call more than once.
    pub fn teardown(&self) {
        self.orchestrator.cancel_timers();
        self.hub.stop_camera();
        self.meter.stop_recording();
        if self.connection.state().is_live() {
            self.connection.disconnect();
        }
        self.orchestrator.detach();
        tracing::info!("controller torn down");
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<ModelGate> {
        &self.gate
    }

    pub fn inference(&self) -> &Arc<InferenceLoop> {
        &self.inference
    }

    pub fn media(&self) -> &Arc<MediaHub> {
        &self.hub
    }

    pub fn meter(&self) -> &Arc<LevelMeter> {
        &self.meter
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestrator> {
        &self.orchestrator
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.teardown();
    }
}
