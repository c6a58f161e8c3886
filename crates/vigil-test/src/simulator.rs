//! Presence simulator
//!
//! Generates a seeded timeline of alternating present/absent spans, the way
//! a user drifts in and out of frame during a long session.

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vigil_core::ExpressionState;

use crate::Scene;

/// Span length ranges, in seconds
#[derive(Debug, Clone)]
pub struct PresenceProfile {
    pub present_secs: (u64, u64),
    pub absent_secs: (u64, u64),
    /// Probability that any one inference cycle glitches
    pub glitch_rate: f64,
}

impl PresenceProfile {
    /// Short glances away, never long enough to drop the session
    pub fn attentive() -> Self {
        PresenceProfile {
            present_secs: (30, 600),
            absent_secs: (1, 40),
            glitch_rate: 0.0,
        }
    }

    /// Frequent long breaks
    pub fn restless() -> Self {
        PresenceProfile {
            present_secs: (10, 300),
            absent_secs: (5, 1800),
            glitch_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub scene: Scene,
    pub duration: Duration,
}

impl Span {
    pub fn is_absent(&self) -> bool {
        self.scene == Scene::Empty
    }
}

pub struct PresenceSimulator {
    profile: PresenceProfile,
    rng: StdRng,
}

impl PresenceSimulator {
    pub fn new(profile: PresenceProfile, seed: u64) -> Self {
        PresenceSimulator {
            profile,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Alternating spans starting with the user in frame
    pub fn timeline(&mut self, spans: usize) -> Vec<Span> {
        let present = Uniform::new_inclusive(self.profile.present_secs.0, self.profile.present_secs.1);
        let absent = Uniform::new_inclusive(self.profile.absent_secs.0, self.profile.absent_secs.1);

        (0..spans)
            .map(|i| {
                if i % 2 == 0 {
                    let face = ExpressionState::CLASSIFIABLE
                        [self.rng.gen_range(0..ExpressionState::CLASSIFIABLE.len())];
                    Span {
                        scene: Scene::Face(face),
                        duration: Duration::from_secs(present.sample(&mut self.rng)),
                    }
                } else {
                    Span {
                        scene: Scene::Empty,
                        duration: Duration::from_secs(absent.sample(&mut self.rng)),
                    }
                }
            })
            .collect()
    }

    /// Should this cycle glitch instead of showing the scene?
    pub fn glitch(&mut self) -> bool {
        self.profile.glitch_rate > 0.0 && self.rng.gen_bool(self.profile.glitch_rate)
    }
}

/// Number of absent spans of at least `min`
pub fn absences_longer_than(timeline: &[Span], min: Duration) -> usize {
    timeline
        .iter()
        .filter(|s| s.is_absent() && s.duration >= min)
        .count()
}
