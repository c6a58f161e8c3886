//! Expression scores - classifier output reduced to one state
//!
//! This is NOT facial recognition. The classifier reports a probability per
//! expression and we keep only the dominant one.

use vigil_core::ExpressionState;

/// One classifier output row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpressionScore {
    pub expression: ExpressionState,
    /// Probability [0.0 - 1.0]
    pub probability: f32,
}

impl ExpressionScore {
    pub fn new(expression: ExpressionState, probability: f32) -> Self {
        ExpressionScore {
            expression,
            probability,
        }
    }

    /// Build from a classifier label; unknown labels yield `None`
    pub fn from_label(label: &str, probability: f32) -> Option<Self> {
        ExpressionState::from_label(label).map(|expression| Self::new(expression, probability))
    }
}

/// Dominant expression among `scores`.
///
/// Starts from neutral at probability 0 and only replaces the current best
/// when a score is strictly greater, so ties keep the first seen. Rows for
/// non-classifiable states and NaN probabilities are ignored.
pub fn select_expression(scores: &[ExpressionScore]) -> ExpressionState {
    let mut best = ExpressionState::Neutral;
    let mut best_probability = 0.0_f32;

    for score in scores {
        if !ExpressionState::CLASSIFIABLE.contains(&score.expression) {
            continue;
        }
        if score.probability > best_probability {
            best_probability = score.probability;
            best = score.expression;
        }
    }

    best
}
