//! Serialized histogram snapshots
//!
//! A checkpoint carries the full bucket layout next to the weights so a
//! reader can refuse to restore it into a histogram with a different layout.

use super::HistogramOptions;
use crate::error::{RecommendationError, Result};
use serde::{Deserialize, Serialize};

/// Checkpoint schema written by this build
pub const CURRENT_CHECKPOINT_VERSION: u32 = 1;

/// Lossless snapshot of a histogram's bucket weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramCheckpoint {
    pub version: u32,
    pub max_value: f64,
    pub bucket_count: usize,
    pub epsilon: f64,
    pub bucket_weights: Vec<f64>,
    pub total_weight: f64,
}

impl HistogramCheckpoint {
    /// Check schema version and internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > CURRENT_CHECKPOINT_VERSION {
            return Err(RecommendationError::UnsupportedCheckpointVersion {
                found: self.version,
                current: CURRENT_CHECKPOINT_VERSION,
            });
        }
        if self.bucket_weights.len() != self.bucket_count {
            return Err(RecommendationError::InvalidCheckpoint(format!(
                "expected {} bucket weights, found {}",
                self.bucket_count,
                self.bucket_weights.len()
            )));
        }
        if let Some((bucket, weight)) = self
            .bucket_weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(RecommendationError::InvalidCheckpoint(format!(
                "bucket {} has invalid weight {}",
                bucket, weight
            )));
        }
        Ok(())
    }

    /// Bucket layout this checkpoint was taken under
    pub fn options(&self) -> Result<HistogramOptions> {
        HistogramOptions::new(self.max_value, self.bucket_count, self.epsilon)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let checkpoint: Self = serde_json::from_slice(bytes)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}
