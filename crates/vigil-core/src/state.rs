//! Presence, readiness and session state
//!
//! These are the small closed enumerations every component exchanges.
//! None of them are persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete classification of the current camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpressionState {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    /// No face was found in the frame
    NoFace,
    /// The inference call itself failed for this cycle
    Error,
}

impl ExpressionState {
    /// Expressions a classifier may report, in classifier order
    pub const CLASSIFIABLE: [ExpressionState; 7] = [
        ExpressionState::Neutral,
        ExpressionState::Happy,
        ExpressionState::Sad,
        ExpressionState::Angry,
        ExpressionState::Fearful,
        ExpressionState::Disgusted,
        ExpressionState::Surprised,
    ];

    /// Parse a classifier label. Only the classifiable expressions are accepted.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "neutral" => Some(ExpressionState::Neutral),
            "happy" => Some(ExpressionState::Happy),
            "sad" => Some(ExpressionState::Sad),
            "angry" => Some(ExpressionState::Angry),
            "fearful" => Some(ExpressionState::Fearful),
            "disgusted" => Some(ExpressionState::Disgusted),
            "surprised" => Some(ExpressionState::Surprised),
            _ => None,
        }
    }

    /// Stable machine-readable key
    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionState::Neutral => "neutral",
            ExpressionState::Happy => "happy",
            ExpressionState::Sad => "sad",
            ExpressionState::Angry => "angry",
            ExpressionState::Fearful => "fearful",
            ExpressionState::Disgusted => "disgusted",
            ExpressionState::Surprised => "surprised",
            ExpressionState::NoFace => "no-face",
            ExpressionState::Error => "error",
        }
    }

    /// Human-readable label for display collaborators
    pub fn label(self) -> &'static str {
        match self {
            ExpressionState::Neutral => "Neutral",
            ExpressionState::Happy => "Happy",
            ExpressionState::Sad => "Sad",
            ExpressionState::Angry => "Angry",
            ExpressionState::Fearful => "Fearful",
            ExpressionState::Disgusted => "Disgusted",
            ExpressionState::Surprised => "Surprised",
            ExpressionState::NoFace => "No face detected",
            ExpressionState::Error => "Recognition error",
        }
    }

    pub fn presence(self) -> Presence {
        match self {
            ExpressionState::NoFace => Presence::Absent,
            ExpressionState::Error => Presence::Unknown,
            _ => Presence::Present,
        }
    }
}

impl fmt::Display for ExpressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a face is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Presence {
    Present,
    Absent,
    /// Not running, or the last cycle failed
    #[default]
    Unknown,
}

impl Presence {
    /// Presence implied by a published expression (`None` = inference stopped)
    pub fn of(state: Option<ExpressionState>) -> Presence {
        state.map_or(Presence::Unknown, ExpressionState::presence)
    }
}

/// Process-wide model load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelReadiness {
    #[default]
    NotLoaded,
    Loaded,
    LoadFailed,
}

impl ModelReadiness {
    /// Loaded and LoadFailed never change again
    pub fn is_terminal(self) -> bool {
        !matches!(self, ModelReadiness::NotLoaded)
    }

    pub fn is_loaded(self) -> bool {
        matches!(self, ModelReadiness::Loaded)
    }
}

/// Lifecycle of the real-time session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Only entered by a manual disconnect
    Disconnecting,
    Disconnected,
}

impl SessionConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, SessionConnectionState::Connected)
    }

    /// Connecting or connected
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionConnectionState::Connecting | SessionConnectionState::Connected
        )
    }
}

impl fmt::Display for SessionConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionConnectionState::Idle => "idle",
            SessionConnectionState::Connecting => "connecting",
            SessionConnectionState::Connected => "connected",
            SessionConnectionState::Disconnecting => "disconnecting",
            SessionConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Instantaneous loudness in [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct VolumeSample(f32);

impl VolumeSample {
    pub const ZERO: VolumeSample = VolumeSample(0.0);

    /// Clamp into [0, 1]; NaN maps to silence
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        VolumeSample(value.clamp(0.0, 1.0))
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for VolumeSample {
    fn from(value: f32) -> Self {
        VolumeSample::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_label_round_trip_for_classifiable() {
        for expr in ExpressionState::CLASSIFIABLE {
            assert_eq!(ExpressionState::from_label(expr.as_str()), Some(expr));
        }
        assert_eq!(ExpressionState::from_label("no-face"), None);
        assert_eq!(ExpressionState::from_label("contempt"), None);
    }

    #[test]
    fn test_presence_mapping() {
        assert_eq!(Presence::of(Some(ExpressionState::Happy)), Presence::Present);
        assert_eq!(Presence::of(Some(ExpressionState::NoFace)), Presence::Absent);
        assert_eq!(Presence::of(Some(ExpressionState::Error)), Presence::Unknown);
        assert_eq!(Presence::of(None), Presence::Unknown);
    }

    #[test]
    fn test_volume_sample_clamps() {
        assert_eq!(VolumeSample::new(1.5).value(), 1.0);
        assert_eq!(VolumeSample::new(-0.2).value(), 0.0);
        assert_eq!(VolumeSample::new(f32::NAN).value(), 0.0);
        assert_eq!(VolumeSample::new(0.42).value(), 0.42);
    }

    #[test]
    fn test_readiness_terminal() {
        assert!(!ModelReadiness::NotLoaded.is_terminal());
        assert!(ModelReadiness::Loaded.is_terminal());
        assert!(ModelReadiness::LoadFailed.is_terminal());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(SessionConnectionState::Disconnecting.to_string(), "disconnecting");
        assert!(SessionConnectionState::Connecting.is_live());
        assert!(!SessionConnectionState::Disconnected.is_live());
    }

    proptest! {
        #[test]
        fn prop_volume_always_in_unit_range(raw in proptest::num::f32::ANY) {
            let v = VolumeSample::new(raw).value();
            prop_assert!((0.0..=1.0).contains(&v));
        }
    }
}
