//! Confidence policy shared by the analysis and graph gates.
//!
//! Both functions are pure: a confidence score maps to a [`Tier`] through two thresholds, and a
//! tier plus the gate's attempt budget maps to a [`Decision`]. The orchestrator owns the attempt
//! counters; nothing here keeps state.

use serde::{Deserialize, Serialize};

/// Default lower bound of the `good` tier.
pub const DEFAULT_CONFIDENCE_GOOD: f64 = 0.7;
/// Default lower bound of the `acceptable` tier.
pub const DEFAULT_CONFIDENCE_ACCEPTABLE: f64 = 0.4;

/// Qualitative band of a confidence score, ordered `Poor < Acceptable < Good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Below the acceptable threshold.
    Poor,
    /// At or above the acceptable threshold but below the good threshold.
    Acceptable,
    /// At or above the good threshold.
    Good,
}

/// Gate outcome for a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Move on to the next stage.
    Proceed,
    /// Re-run the upstream generation stage.
    Retry,
    /// Budget exhausted with a poor result; record for review and move on.
    Fail,
}

/// Threshold pair used by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Scores at or above this value are `good`.
    pub good: f64,
    /// Scores at or above this value (and below `good`) are `acceptable`.
    pub acceptable: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            good: DEFAULT_CONFIDENCE_GOOD,
            acceptable: DEFAULT_CONFIDENCE_ACCEPTABLE,
        }
    }
}

impl Thresholds {
    /// Whether both bounds sit in `[0, 1]` and `acceptable <= good`.
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.good)
            && (0.0..=1.0).contains(&self.acceptable)
            && self.acceptable <= self.good
    }
}

/// Map a confidence score onto a tier. NaN is treated as `poor`.
pub fn classify(confidence: f64, thresholds: Thresholds) -> Tier {
    if confidence.is_nan() {
        return Tier::Poor;
    }
    if confidence >= thresholds.good {
        Tier::Good
    } else if confidence >= thresholds.acceptable {
        Tier::Acceptable
    } else {
        Tier::Poor
    }
}

/// Decide what a gate does with a tier given how many attempts it has already spent.
///
/// `attempts_used` counts generation attempts evaluated at this gate, including the current one.
pub fn decide(tier: Tier, attempts_used: u32, max_attempts: u32) -> Decision {
    match tier {
        Tier::Good | Tier::Acceptable => Decision::Proceed,
        Tier::Poor if attempts_used < max_attempts => Decision::Retry,
        Tier::Poor => Decision::Fail,
    }
}
