//! Inference loop - periodic expression sampling
//!
//! One task per running loop. Each cycle:
//! 1. checks the model gate and that its generation is still current
//! 2. classifies the latest frame of the shared source
//! 3. publishes the resulting `ExpressionState`
//! 4. sleeps for the configured interval, measured from completion
//!
//! INVARIANT: at most one inference call is in flight, and nothing is
//! published by a loop whose generation has been cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use vigil_core::{ExpressionState, MediaSource, TimerSlot, TimerToken, VigilError, VigilResult};

use crate::{select_expression, ExpressionModel, ModelGate};

/// Inference loop configuration
#[derive(Clone, Debug)]
pub struct InferenceConfig {
    /// Delay between the end of one cycle and the start of the next
    pub interval: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub cycles: u64,
    pub no_face: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    no_face: AtomicU64,
    failures: AtomicU64,
}

struct LoopState {
    /// Armed while a loop is active; the token is the loop's generation
    slot: TimerSlot,
    last_error: Option<VigilError>,
}

struct LoopInner {
    model: Arc<dyn ExpressionModel>,
    gate: Arc<ModelGate>,
    config: InferenceConfig,
    expression: watch::Sender<Option<ExpressionState>>,
    state: Mutex<LoopState>,
    counters: Counters,
}

/// Periodic expression classifier over a live source
pub struct InferenceLoop {
    inner: Arc<LoopInner>,
}

impl InferenceLoop {
    pub fn new(
        model: Arc<dyn ExpressionModel>,
        gate: Arc<ModelGate>,
        config: InferenceConfig,
    ) -> Self {
        let (expression, _) = watch::channel(None);
        InferenceLoop {
            inner: Arc::new(LoopInner {
                model,
                gate,
                config,
                expression,
                state: Mutex::new(LoopState {
                    slot: TimerSlot::new(),
                    last_error: None,
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// Begin sampling `source`. Replaces a loop that is already running.
    /// Fails without starting when the model is not loaded.
    pub fn start(&self, source: MediaSource) -> VigilResult<()> {
        let mut state = self.inner.state.lock();

        if let Err(e) = self.inner.gate.ensure_loaded() {
            tracing::warn!(error = %e, "inference not started");
            state.last_error = Some(e.clone());
            return Err(e);
        }

        let token = state.slot.arm();
        state.last_error = None;
        tracing::info!(source = %source.id(), generation = token.generation(), "inference started");

        let handle = tokio::spawn(run_cycles(Arc::clone(&self.inner), source, token));
        state.slot.attach(token, handle);
        Ok(())
    }

    /// Halt sampling and reset the published state to `None`.
    /// Any pending cycle is cancelled before this returns.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.slot.cancel() {
            tracing::info!("inference stopped");
        }
        self.inner.expression.send_if_modified(|current| current.take().is_some());
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().slot.is_armed()
    }

    /// Latest published expression (`None` while stopped)
    pub fn current(&self) -> Option<ExpressionState> {
        *self.inner.expression.borrow()
    }

    /// Change notifications for the published expression
    pub fn subscribe(&self) -> watch::Receiver<Option<ExpressionState>> {
        self.inner.expression.subscribe()
    }

    /// Why the last `start` was refused, if it was
    pub fn last_error(&self) -> Option<VigilError> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn stats(&self) -> InferenceStats {
        let c = &self.inner.counters;
        InferenceStats {
            cycles: c.cycles.load(Ordering::Relaxed),
            no_face: c.no_face.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for InferenceLoop {
    fn drop(&mut self) {
        self.inner.state.lock().slot.cancel();
    }
}

async fn run_cycles(inner: Arc<LoopInner>, source: MediaSource, token: TimerToken) {
    loop {
        if !inner.gate.readiness().is_loaded() || !inner.state.lock().slot.is_current(token) {
            break;
        }

        let next = classify(&inner, &source).await;

        {
            let state = inner.state.lock();
            if !state.slot.is_current(token) {
                break;
            }
            inner.expression.send_if_modified(|current| {
                let changed = *current != Some(next);
                *current = Some(next);
                changed
            });
        }

        tokio::time::sleep(inner.config.interval).await;
    }
    tracing::debug!(generation = token.generation(), "inference loop exited");
}

async fn classify(inner: &LoopInner, source: &MediaSource) -> ExpressionState {
    inner.counters.cycles.fetch_add(1, Ordering::Relaxed);

    let outcome = match source.latest_frame() {
        Some(frame) => inner.model.infer(&frame).await,
        None => Ok(None),
    };

    match outcome {
        Ok(Some(scores)) => select_expression(&scores),
        Ok(None) => {
            inner.counters.no_face.fetch_add(1, Ordering::Relaxed);
            ExpressionState::NoFace
        }
        Err(e) => {
            inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, "inference cycle failed");
            ExpressionState::Error
        }
    }
}
