//! Age-based down-weighting of histogram samples

use chrono::{DateTime, Utc};
use std::fmt;

/// Strategy applied to every sample weight before it reaches a bucket
pub trait DecayPolicy: fmt::Debug + Send + Sync {
    /// Weight to record for a sample of `weight` observed at `sample_time`
    fn decayed_weight(&self, weight: f64, sample_time: DateTime<Utc>) -> f64;
}

/// Pure accumulation: every sample keeps its weight regardless of age
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDecay;

impl DecayPolicy for NoDecay {
    fn decayed_weight(&self, weight: f64, _sample_time: DateTime<Utc>) -> f64 {
        weight
    }
}
