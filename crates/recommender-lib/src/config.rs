//! Tunables for histogram layout, windowing and batching

use crate::error::{RecommendationError, Result};
use serde::{Deserialize, Serialize};

/// Number of histogram buckets
pub const NUMBER_OF_BUCKETS: usize = 1000;

/// Minimum per-bucket weight used when querying percentiles
pub const EPSILON: f64 = 0.0001;

/// Percentiles computed for every recommendation
pub const REQUIRED_PERCENTILES: [u8; 5] = [50, 80, 90, 95, 99];

/// Workloads fetched from external sources per batch
pub const BATCH_SIZE: usize = 20;

/// Days merged into a recommendation, today included
pub const RECOMMENDATION_FOR_DAYS: u32 = 7;

/// Configuration for the recommendation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,

    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<u8>,

    /// Percentile used as the basis for savings estimation
    #[serde(default = "default_savings_percentile")]
    pub savings_percentile: u8,

    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Bounds external I/O fan-out
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bounds concurrent per-workload computations
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    #[serde(default = "default_avg_utilization_weight")]
    pub avg_utilization_weight: f64,

    #[serde(default = "default_max_utilization_weight")]
    pub max_utilization_weight: f64,
}

fn default_bucket_count() -> usize {
    NUMBER_OF_BUCKETS
}

fn default_epsilon() -> f64 {
    EPSILON
}

fn default_percentiles() -> Vec<u8> {
    REQUIRED_PERCENTILES.to_vec()
}

fn default_savings_percentile() -> u8 {
    90
}

fn default_window_days() -> u32 {
    RECOMMENDATION_FOR_DAYS
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_ttl_days() -> i64 {
    30
}

fn default_avg_utilization_weight() -> f64 {
    2.0
}

fn default_max_utilization_weight() -> f64 {
    1.0
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            bucket_count: default_bucket_count(),
            epsilon: default_epsilon(),
            percentiles: default_percentiles(),
            savings_percentile: default_savings_percentile(),
            window_days: default_window_days(),
            batch_size: default_batch_size(),
            worker_pool_size: default_worker_pool_size(),
            ttl_days: default_ttl_days(),
            avg_utilization_weight: default_avg_utilization_weight(),
            max_utilization_weight: default_max_utilization_weight(),
        }
    }
}

impl RecommenderConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RecommendationError::InvalidOptions(msg));

        if self.bucket_count == 0 {
            return invalid("bucket_count must be > 0".to_string());
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return invalid(format!("epsilon must be a positive number, got {}", self.epsilon));
        }
        if self.window_days == 0 {
            return invalid("window_days must be > 0".to_string());
        }
        if self.batch_size == 0 || self.worker_pool_size == 0 {
            return invalid("batch_size and worker_pool_size must be > 0".to_string());
        }
        if self.ttl_days <= 0 {
            return invalid(format!("ttl_days must be > 0, got {}", self.ttl_days));
        }
        if let Some(p) = self.percentiles.iter().find(|p| **p > 100) {
            return invalid(format!("percentile {} is outside 0..=100", p));
        }
        if !self.percentiles.contains(&self.savings_percentile) {
            return invalid(format!(
                "savings_percentile {} is not one of the computed percentiles {:?}",
                self.savings_percentile, self.percentiles
            ));
        }
        if self.avg_utilization_weight < 0.0 || self.max_utilization_weight < 0.0 {
            return invalid("utilization weights must be non-negative".to_string());
        }
        Ok(())
    }
}
