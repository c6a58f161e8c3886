//! Expression model collaborator and the one-shot load gate

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use vigil_core::{ModelReadiness, VideoFrame, VigilError, VigilResult};

use crate::ExpressionScore;

/// Facial expression classifier
#[async_trait]
pub trait ExpressionModel: Send + Sync {
    /// Load weights. Called once per process.
    async fn load(&self) -> VigilResult<()>;

    /// Classify one frame. `Ok(None)` means no face was found.
    async fn infer(&self, frame: &VideoFrame) -> VigilResult<Option<Vec<ExpressionScore>>>;
}

/// Process-wide model readiness
///
/// INVARIANT: moves from NotLoaded to a terminal state at most once.
pub struct ModelGate {
    readiness: watch::Sender<ModelReadiness>,
    loading: AtomicBool,
    failure: Mutex<Option<VigilError>>,
}

impl ModelGate {
    pub fn new() -> Self {
        let (readiness, _) = watch::channel(ModelReadiness::NotLoaded);
        ModelGate {
            readiness,
            loading: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub fn readiness(&self) -> ModelReadiness {
        *self.readiness.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelReadiness> {
        self.readiness.subscribe()
    }

    /// Load the model once. Concurrent and later callers observe the result
    /// of the first load instead of loading again.
    pub async fn load(&self, model: &dyn ExpressionModel) -> ModelReadiness {
        if self.loading.swap(true, Ordering::SeqCst) {
            let mut rx = self.subscribe();
            return match rx.wait_for(|r| r.is_terminal()).await {
                Ok(r) => *r,
                Err(_) => self.readiness(),
            };
        }

        tracing::info!("loading expression model");
        match model.load().await {
            Ok(()) => {
                self.mark(ModelReadiness::Loaded);
                tracing::info!("expression model loaded");
            }
            Err(e) => {
                let message = match e {
                    VigilError::ModelLoadFailed(msg) => msg,
                    other => other.to_string(),
                };
                tracing::error!(error = %message, "expression model failed to load");
                *self.failure.lock() = Some(VigilError::ModelLoadFailed(message));
                self.mark(ModelReadiness::LoadFailed);
            }
        }
        self.readiness()
    }

    /// Record a terminal readiness. Returns false if one was already recorded.
    pub fn mark(&self, readiness: ModelReadiness) -> bool {
        if !readiness.is_terminal() {
            return false;
        }
        self.readiness.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = readiness;
            true
        })
    }

    /// The permanent load failure, if any
    pub fn failure(&self) -> Option<VigilError> {
        self.failure.lock().clone()
    }

    /// Ok when loaded; otherwise the error that blocks inference and capture
    pub fn ensure_loaded(&self) -> VigilResult<()> {
        match self.readiness() {
            ModelReadiness::Loaded => Ok(()),
            ModelReadiness::NotLoaded => Err(VigilError::ModelNotLoaded),
            ModelReadiness::LoadFailed => Err(self
                .failure()
                .unwrap_or_else(|| VigilError::ModelLoadFailed("unknown".into()))),
        }
    }
}

impl Default for ModelGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    struct SlowModel {
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ExpressionModel for SlowModel {
        async fn load(&self) -> VigilResult<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                Err(VigilError::ModelLoadFailed("weights missing".into()))
            } else {
                Ok(())
            }
        }

        async fn infer(&self, _frame: &VideoFrame) -> VigilResult<Option<Vec<ExpressionScore>>> {
            Ok(None)
        }
    }

    fn model(fail: bool) -> Arc<SlowModel> {
        Arc::new(SlowModel {
            loads: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_success() {
        let gate = ModelGate::new();
        assert_eq!(gate.ensure_loaded(), Err(VigilError::ModelNotLoaded));

        let m = model(false);
        assert_eq!(gate.load(m.as_ref()).await, ModelReadiness::Loaded);
        assert!(gate.ensure_loaded().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_permanent() {
        let gate = ModelGate::new();
        let m = model(true);
        assert_eq!(gate.load(m.as_ref()).await, ModelReadiness::LoadFailed);
        assert_eq!(
            gate.ensure_loaded(),
            Err(VigilError::ModelLoadFailed("weights missing".into()))
        );

        // A later success report cannot revive the gate
        assert!(!gate.mark(ModelReadiness::Loaded));
        assert_eq!(gate.readiness(), ModelReadiness::LoadFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_attempt() {
        let gate = Arc::new(ModelGate::new());
        let m = model(false);

        let (a, b) = tokio::join!(gate.load(m.as_ref()), gate.load(m.as_ref()));
        assert_eq!(a, ModelReadiness::Loaded);
        assert_eq!(b, ModelReadiness::Loaded);
        assert_eq!(m.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_rejects_not_loaded() {
        let gate = ModelGate::new();
        assert!(!gate.mark(ModelReadiness::NotLoaded));
        assert!(gate.mark(ModelReadiness::Loaded));
        assert!(!gate.mark(ModelReadiness::LoadFailed));
    }
}
