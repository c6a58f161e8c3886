//! Volume throttle
//!
//! Raw loudness arrives far faster than anything needs to redraw. A sample
//! is published only when it is audible, or when it moved far enough from
//! the last published value to matter (e.g. falling back to silence).

use serde::{Deserialize, Serialize};
use vigil_core::VolumeSample;

/// Audible floor
pub const DEFAULT_FLOOR: f32 = 0.01;

/// Minimum jump from the last published value
pub const DEFAULT_DELTA: f32 = 0.25;

/// Throttle thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub floor: f32,
    pub delta: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        MeterConfig {
            floor: DEFAULT_FLOOR,
            delta: DEFAULT_DELTA,
        }
    }
}

/// Whether `new` should replace the last published sample
pub fn should_publish(new: f32, last: f32, config: &MeterConfig) -> bool {
    new > config.floor || (new - last).abs() > config.delta
}

/// Stateful wrapper around [`should_publish`]
#[derive(Debug, Clone)]
pub struct VolumeThrottle {
    config: MeterConfig,
    last: VolumeSample,
}

impl VolumeThrottle {
    pub fn new(config: MeterConfig) -> Self {
        VolumeThrottle {
            config,
            last: VolumeSample::ZERO,
        }
    }

    /// Offer a raw sample; returns it when it should be published
    pub fn offer(&mut self, raw: f32) -> Option<VolumeSample> {
        let sample = VolumeSample::new(raw);
        if should_publish(sample.value(), self.last.value(), &self.config) {
            self.last = sample;
            Some(sample)
        } else {
            None
        }
    }

    pub fn last(&self) -> VolumeSample {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = VolumeSample::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quiet_samples_are_dropped() {
        let mut throttle = VolumeThrottle::new(MeterConfig::default());
        let published: Vec<_> = [0.005, 0.006, 0.004]
            .into_iter()
            .filter_map(|s| throttle.offer(s))
            .collect();
        assert!(published.is_empty());
        assert_eq!(throttle.last(), VolumeSample::ZERO);
    }

    #[test]
    fn test_loud_sample_published_once() {
        let mut throttle = VolumeThrottle::new(MeterConfig::default());
        assert_eq!(throttle.offer(0.3), Some(VolumeSample::new(0.3)));
    }

    #[test]
    fn test_drop_to_silence_is_published() {
        let mut throttle = VolumeThrottle::new(MeterConfig::default());
        throttle.offer(0.8);
        // Below the floor but far from the last published value
        assert_eq!(throttle.offer(0.0), Some(VolumeSample::ZERO));
        // Second quiet sample is now close to the last one
        assert_eq!(throttle.offer(0.002), None);
    }

    #[test]
    fn test_reset() {
        let mut throttle = VolumeThrottle::new(MeterConfig::default());
        throttle.offer(0.5);
        throttle.reset();
        assert_eq!(throttle.last(), VolumeSample::ZERO);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = MeterConfig {
            floor: 0.5,
            delta: 0.9,
        };
        assert!(!should_publish(0.4, 0.0, &config));
        assert!(should_publish(0.6, 0.0, &config));
    }

    proptest! {
        #[test]
        fn prop_matches_rule(new in 0.0f32..=1.0, last in 0.0f32..=1.0) {
            let config = MeterConfig::default();
            let expected = new > DEFAULT_FLOOR || (new - last).abs() > DEFAULT_DELTA;
            prop_assert_eq!(should_publish(new, last, &config), expected);
        }

        #[test]
        fn prop_sub_floor_stream_from_zero_never_publishes(
            samples in proptest::collection::vec(0.0f32..=DEFAULT_FLOOR, 0..64)
        ) {
            let mut throttle = VolumeThrottle::new(MeterConfig::default());
            for s in samples {
                prop_assert!(throttle.offer(s).is_none());
            }
        }
    }
}
