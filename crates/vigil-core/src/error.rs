//! Error types for Vigil

use thiserror::Error;

/// How a failure should be treated by the component that observed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Disables the corresponding action until process restart
    Permanent,
    /// Surfaced to the user, the control stays enabled for retry
    Recoverable,
    /// Absorbed internally; affects a single cycle only
    Transient,
}

/// Core Vigil errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VigilError {
    // Model errors
    #[error("Expression model is not loaded yet")]
    ModelNotLoaded,

    #[error("Expression model failed to load: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    // Capture errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    // Transport errors
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    // Session errors
    #[error("No signed-in user")]
    NotSignedIn,

    #[error("Microphone must be active before starting a session")]
    MicrophoneInactive,

    #[error("Identity provider error: {0}")]
    Identity(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VigilError {
    /// Classify the error for propagation purposes
    pub fn severity(&self) -> Severity {
        match self {
            VigilError::ModelLoadFailed(_) => Severity::Permanent,
            VigilError::Inference(_) => Severity::Transient,
            _ => Severity::Recoverable,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            VigilError::ModelNotLoaded => {
                "Please wait until the face recognition model has finished loading.".into()
            }
            VigilError::ModelLoadFailed(_) => "Failed to load the face recognition model.".into(),
            VigilError::Inference(_) => "Expression recognition error.".into(),
            VigilError::PermissionDenied(_) | VigilError::DeviceUnavailable(_) => {
                "Failed to start the camera. Please allow access to the camera.".into()
            }
            VigilError::MicrophoneUnavailable(_) => {
                "Failed to start the microphone. Please allow access to the microphone.".into()
            }
            VigilError::ConnectFailed(_) | VigilError::Transport(_) => {
                "Could not reach the conversation service. Please try again.".into()
            }
            VigilError::NotConnected => "The conversation is not connected.".into(),
            VigilError::NotSignedIn => "Please sign in before starting.".into(),
            VigilError::MicrophoneInactive => "Enable audio to start.".into(),
            VigilError::Identity(_) => "Could not verify your identity. Please try again.".into(),
            VigilError::Config(msg) => format!("Invalid configuration: {msg}"),
        }
    }
}

/// Result type for Vigil operations
pub type VigilResult<T> = Result<T, VigilError>;
