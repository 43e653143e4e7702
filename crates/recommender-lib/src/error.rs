//! Error kinds raised while computing recommendations
//!
//! Every kind is scoped to a single workload. Only store and source
//! failures are worth retrying; the rest repeat on every run until the
//! underlying data changes.

use thiserror::Error;

/// Errors produced by the histogram, aggregation and pipeline layers
#[derive(Debug, Error)]
pub enum RecommendationError {
    /// Two histograms (or a histogram and a checkpoint) disagree on bucket layout
    #[error(
        "histogram configuration mismatch: expected max_value={expected_max} buckets={expected_buckets}, \
         got max_value={actual_max} buckets={actual_buckets}"
    )]
    ConfigMismatch {
        expected_max: f64,
        expected_buckets: usize,
        actual_max: f64,
        actual_buckets: usize,
    },

    /// No current resource allocation is known for the workload
    #[error("no resource allocation known for workload {workload_id}")]
    MissingAllocation { workload_id: String },

    /// No billing data was found for the workload
    #[error("no last-day cost available for workload {workload_id}")]
    CostDataUnavailable { workload_id: String },

    /// An external store or source failed; the caller may retry the run
    #[error("{operation} failed: {source}")]
    TransientStoreFailure {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid histogram options: {0}")]
    InvalidOptions(String),

    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("unsupported checkpoint version {found} (supported 1..={current})")]
    UnsupportedCheckpointVersion { found: u32, current: u32 },

    #[error("checkpoint codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl RecommendationError {
    /// Wrap a collaborator failure
    pub fn transient(operation: &'static str, source: anyhow::Error) -> Self {
        Self::TransientStoreFailure { operation, source }
    }

    /// Whether rerunning the same day may succeed without data changes
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure { .. })
    }

    /// Short machine-readable kind, used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMismatch { .. } => "config_mismatch",
            Self::MissingAllocation { .. } => "missing_allocation",
            Self::CostDataUnavailable { .. } => "cost_data_unavailable",
            Self::TransientStoreFailure { .. } => "transient_store_failure",
            Self::InvalidOptions(_) => "invalid_options",
            Self::InvalidCheckpoint(_) => "invalid_checkpoint",
            Self::UnsupportedCheckpointVersion { .. } => "unsupported_checkpoint_version",
            Self::Codec(_) => "codec",
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommendationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_failures_are_retryable() {
        let transient =
            RecommendationError::transient("fetch utilization", anyhow::anyhow!("timeout"));
        assert!(transient.is_retryable());
        assert!(transient.to_string().contains("fetch utilization"));

        let missing = RecommendationError::MissingAllocation {
            workload_id: "svc".to_string(),
        };
        assert!(!missing.is_retryable());
        assert_eq!(missing.kind(), "missing_allocation");
    }
}
