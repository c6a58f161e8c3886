//! Runtime configuration
//!
//! JSON with human-readable durations:
//!
//! ```json
//! {
//!   "inference": { "interval": "1s" },
//!   "policy": { "reconnect_after": "15m", "disappear_grace": "60s" },
//!   "meter": { "floor": 0.01, "delta": 0.25 },
//!   "log": { "filter": "info,vigil_runtime=debug", "format": "json" }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_core::{CaptureConstraints, VigilError, VigilResult};
use vigil_vision::InferenceConfig;
use vigil_voice::MeterConfig;

use crate::{LogConfig, PolicyConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    #[serde(with = "duration_str")]
    pub interval: Duration,
}

impl Default for InferenceSection {
    fn default() -> Self {
        InferenceSection {
            interval: InferenceConfig::default().interval,
        }
    }
}

impl From<&InferenceSection> for InferenceConfig {
    fn from(section: &InferenceSection) -> Self {
        InferenceConfig {
            interval: section.interval,
        }
    }
}

/// Everything the controller needs besides its collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub inference: InferenceSection,
    pub policy: PolicyConfig,
    pub meter: MeterConfig,
    pub camera: CaptureConstraints,
    pub log: LogConfig,
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> VigilResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)
            .map_err(|e| VigilError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> VigilResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| VigilError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> VigilResult<()> {
        if self.inference.interval.is_zero() {
            return Err(VigilError::Config("inference.interval must be non-zero".into()));
        }
        if self.policy.disappear_grace.is_zero() {
            return Err(VigilError::Config("policy.disappear_grace must be non-zero".into()));
        }
        for (name, value) in [("meter.floor", self.meter.floor), ("meter.delta", self.meter.delta)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VigilError::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

/// `Duration` as a humantime string ("15m", "1s 500ms")
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.policy.reconnect_after, Duration::from_secs(900));
        assert_eq!(config.policy.disappear_grace, Duration::from_secs(60));
        assert_eq!(config.inference.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_human_durations() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "inference": { "interval": "250ms" },
                "policy": { "reconnect_after": "20m", "disappear_grace": "1m 30s" },
                "log": { "format": "json" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.inference.interval, Duration::from_millis(250));
        assert_eq!(config.policy.reconnect_after, Duration::from_secs(1200));
        assert_eq!(config.policy.disappear_grace, Duration::from_secs(90));
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.policy.require_microphone);
    }

    #[test]
    fn test_round_trip_keeps_durations_readable() {
        let json = serde_json::to_string(&RuntimeConfig::default()).unwrap();
        assert!(json.contains(r#""reconnect_after":"15m""#));
        assert_eq!(RuntimeConfig::from_json_str(&json).unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{ "inference": { "interval": "0s" } }"#),
            Err(VigilError::Config(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{ "meter": { "delta": 1.5 } }"#),
            Err(VigilError::Config(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{ "policy": { "reconnect_after": "soon" } }"#),
            Err(VigilError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = RuntimeConfig::from_json_file("/nonexistent/vigil.json").unwrap_err();
        assert!(matches!(err, VigilError::Config(msg) if msg.contains("vigil.json")));
    }
}
