//! Fixed-bucket weighted histogram
//!
//! Values are clipped into `[0, max_value]` and assigned to one of
//! `bucket_count` equally sized buckets. Percentile queries floor every
//! bucket at `epsilon`, so they stay defined even before any sample has
//! been recorded: an empty histogram reports the quantiles of a uniform
//! distribution over its range.

mod checkpoint;
mod decay;
mod view;

pub use checkpoint::{HistogramCheckpoint, CURRENT_CHECKPOINT_VERSION};
pub use decay::{DecayPolicy, NoDecay};
pub use view::HistogramView;

use crate::error::{RecommendationError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Bucket layout of a histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramOptions {
    max_value: f64,
    bucket_count: usize,
    epsilon: f64,
}

impl HistogramOptions {
    pub fn new(max_value: f64, bucket_count: usize, epsilon: f64) -> Result<Self> {
        if !(max_value.is_finite() && max_value > 0.0) {
            return Err(RecommendationError::InvalidOptions(format!(
                "max_value must be a positive number, got {}",
                max_value
            )));
        }
        if bucket_count == 0 {
            return Err(RecommendationError::InvalidOptions(
                "bucket_count must be > 0".to_string(),
            ));
        }
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(RecommendationError::InvalidOptions(format!(
                "epsilon must be a positive number, got {}",
                epsilon
            )));
        }
        Ok(Self {
            max_value,
            bucket_count,
            epsilon,
        })
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn bucket_size(&self) -> f64 {
        self.max_value / self.bucket_count as f64
    }

    /// Lower bound of a bucket
    pub fn bucket_start(&self, bucket: usize) -> f64 {
        self.bucket_size() * bucket as f64
    }

    /// Bucket a (clipped) value falls into
    pub fn find_bucket(&self, value: f64) -> usize {
        let clipped = clip(value, self.max_value);
        let bucket = (clipped / self.bucket_size()).floor() as usize;
        bucket.min(self.bucket_count - 1)
    }

    fn ensure_same_layout(&self, max_value: f64, bucket_count: usize) -> Result<()> {
        if self.max_value != max_value || self.bucket_count != bucket_count {
            return Err(RecommendationError::ConfigMismatch {
                expected_max: self.max_value,
                expected_buckets: self.bucket_count,
                actual_max: max_value,
                actual_buckets: bucket_count,
            });
        }
        Ok(())
    }
}

fn clip(value: f64, max_value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max_value)
    }
}

/// Weighted histogram exclusively owned by the step building it.
///
/// Merges mutate the receiver in place; the argument is only read.
#[derive(Debug, Clone)]
pub struct DecayingHistogram {
    options: HistogramOptions,
    bucket_weights: Vec<f64>,
    decay: Arc<dyn DecayPolicy>,
}

impl DecayingHistogram {
    /// Empty histogram that accumulates without decay
    pub fn new(options: HistogramOptions) -> Self {
        Self::with_decay(options, Arc::new(NoDecay))
    }

    pub fn with_decay(options: HistogramOptions, decay: Arc<dyn DecayPolicy>) -> Self {
        Self {
            options,
            bucket_weights: vec![0.0; options.bucket_count],
            decay,
        }
    }

    /// Rebuild a histogram using the layout stored in the checkpoint
    pub fn from_checkpoint(checkpoint: &HistogramCheckpoint) -> Result<Self> {
        checkpoint.validate()?;
        let mut histogram = Self::new(checkpoint.options()?);
        histogram
            .bucket_weights
            .copy_from_slice(&checkpoint.bucket_weights);
        Ok(histogram)
    }

    pub fn options(&self) -> &HistogramOptions {
        &self.options
    }

    pub fn bucket_weights(&self) -> &[f64] {
        &self.bucket_weights
    }

    /// Record `value` with `weight`; the decay policy may scale the weight by age
    pub fn add_sample(&mut self, value: f64, weight: f64, timestamp: DateTime<Utc>) {
        let weight = self.decay.decayed_weight(weight, timestamp);
        if !(weight.is_finite() && weight > 0.0) {
            return;
        }
        let bucket = self.options.find_bucket(value);
        self.bucket_weights[bucket] += weight;
    }

    /// Sum of recorded weights, excluding the epsilon floor
    pub fn total_weight(&self) -> f64 {
        self.bucket_weights.iter().sum()
    }

    /// True when no sample has been recorded
    pub fn is_empty(&self) -> bool {
        self.bucket_weights.iter().all(|w| *w == 0.0)
    }

    fn effective_weight(&self, bucket: usize) -> f64 {
        self.bucket_weights[bucket].max(self.options.epsilon)
    }

    /// Value below which `percentile`% of the weight falls, `percentile` in `[0, 100]`.
    ///
    /// Returns the lower bound of the first bucket whose cumulative weight
    /// reaches the threshold. Out-of-range inputs are clamped.
    pub fn percentile(&self, percentile: f64) -> f64 {
        let percentile = if percentile.is_nan() {
            0.0
        } else {
            percentile.clamp(0.0, 100.0)
        };

        let total: f64 = (0..self.options.bucket_count)
            .map(|b| self.effective_weight(b))
            .sum();
        let threshold = percentile / 100.0 * total;

        let mut partial_sum = 0.0;
        for bucket in 0..self.options.bucket_count {
            partial_sum += self.effective_weight(bucket);
            if partial_sum >= threshold {
                return self.options.bucket_start(bucket);
            }
        }
        self.options.bucket_start(self.options.bucket_count - 1)
    }

    /// Add the other histogram's weights bucket by bucket
    pub fn merge(&mut self, other: &DecayingHistogram) -> Result<()> {
        self.options
            .ensure_same_layout(other.options.max_value, other.options.bucket_count)?;
        let incoming = &other.bucket_weights;
        for (mine, theirs) in self.bucket_weights.iter_mut().zip(incoming) {
            *mine += *theirs;
        }
        Ok(())
    }

    pub fn save_checkpoint(&self) -> HistogramCheckpoint {
        HistogramCheckpoint {
            version: CURRENT_CHECKPOINT_VERSION,
            max_value: self.options.max_value,
            bucket_count: self.options.bucket_count,
            epsilon: self.options.epsilon,
            bucket_weights: self.bucket_weights.clone(),
            total_weight: self.total_weight(),
        }
    }

    /// Replace this histogram's weights with the checkpoint's.
    ///
    /// The checkpoint must have been taken under the same bucket layout.
    pub fn load_checkpoint(&mut self, checkpoint: &HistogramCheckpoint) -> Result<()> {
        checkpoint.validate()?;
        self.options
            .ensure_same_layout(checkpoint.max_value, checkpoint.bucket_count)?;
        self.bucket_weights
            .copy_from_slice(&checkpoint.bucket_weights);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_value: f64) -> HistogramOptions {
        HistogramOptions::new(max_value, 1000, 0.0001).unwrap()
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(HistogramOptions::new(0.0, 1000, 0.0001).is_err());
        assert!(HistogramOptions::new(f64::NAN, 1000, 0.0001).is_err());
        assert!(HistogramOptions::new(100.0, 0, 0.0001).is_err());
        assert!(HistogramOptions::new(100.0, 1000, 0.0).is_err());
    }

    #[test]
    fn test_values_clipped_into_range() {
        let opts = options(1000.0);
        assert_eq!(opts.find_bucket(-5.0), 0);
        assert_eq!(opts.find_bucket(f64::NAN), 0);
        assert_eq!(opts.find_bucket(1000.0), 999);
        assert_eq!(opts.find_bucket(5000.0), 999);
        assert_eq!(opts.find_bucket(500.0), 500);
        assert_eq!(opts.find_bucket(500.9), 500);
    }

    #[test]
    fn test_weighted_average_and_peak() {
        let mut histogram = DecayingHistogram::new(options(1000.0));
        let now = Utc::now();
        histogram.add_sample(0.5 * 1000.0, 2.0, now);
        histogram.add_sample(0.8 * 1000.0, 1.0, now);

        assert_eq!(histogram.bucket_weights()[500], 2.0);
        assert_eq!(histogram.bucket_weights()[800], 1.0);
        assert_eq!(histogram.total_weight(), 3.0);

        let p50 = histogram.percentile(50.0);
        assert!((500.0..501.0).contains(&p50), "p50 was {}", p50);
        assert_eq!(histogram.percentile(99.0), 800.0);
    }

    #[test]
    fn test_empty_histogram_is_uniform() {
        let histogram = DecayingHistogram::new(options(1000.0));
        assert!(histogram.is_empty());
        assert_eq!(histogram.percentile(0.0), 0.0);
        let p50 = histogram.percentile(50.0);
        assert!((499.0..=500.0).contains(&p50), "p50 was {}", p50);
        assert!(histogram.percentile(100.0) <= 999.0);
        assert!(histogram.percentile(100.0).is_finite());
    }

    #[test]
    fn test_out_of_range_percentiles_clamped() {
        let mut histogram = DecayingHistogram::new(options(100.0));
        histogram.add_sample(42.0, 1.0, Utc::now());
        assert_eq!(histogram.percentile(-10.0), histogram.percentile(0.0));
        assert_eq!(histogram.percentile(250.0), histogram.percentile(100.0));
        assert_eq!(histogram.percentile(f64::NAN), histogram.percentile(0.0));
    }

    #[test]
    fn test_non_positive_weights_ignored() {
        let mut histogram = DecayingHistogram::new(options(100.0));
        let now = Utc::now();
        histogram.add_sample(10.0, 0.0, now);
        histogram.add_sample(10.0, -3.0, now);
        histogram.add_sample(10.0, f64::INFINITY, now);
        assert!(histogram.is_empty());
    }

    #[test]
    fn test_merge_requires_same_layout() {
        let mut a = DecayingHistogram::new(options(1000.0));
        let b = DecayingHistogram::new(options(2000.0));
        let err = a.merge(&b).unwrap_err();
        assert!(matches!(err, RecommendationError::ConfigMismatch { .. }));
    }

    #[test]
    fn test_merge_sums_buckets() {
        let now = Utc::now();
        let mut a = DecayingHistogram::new(options(1000.0));
        a.add_sample(100.0, 2.0, now);
        let mut b = DecayingHistogram::new(options(1000.0));
        b.add_sample(100.0, 1.0, now);
        b.add_sample(900.0, 4.0, now);

        a.merge(&b).unwrap();
        assert_eq!(a.bucket_weights()[100], 3.0);
        assert_eq!(a.bucket_weights()[900], 4.0);
        assert_eq!(a.total_weight(), 7.0);
    }

    #[test]
    fn test_load_checkpoint_into_other_layout_fails() {
        let mut histogram = DecayingHistogram::new(options(1000.0));
        histogram.add_sample(10.0, 1.0, Utc::now());
        let checkpoint = histogram.save_checkpoint();

        let mut scratch = DecayingHistogram::new(options(512.0));
        assert!(matches!(
            scratch.load_checkpoint(&checkpoint),
            Err(RecommendationError::ConfigMismatch { .. })
        ));

        let mut same = DecayingHistogram::new(options(1000.0));
        same.load_checkpoint(&checkpoint).unwrap();
        assert_eq!(same.bucket_weights(), histogram.bucket_weights());
    }

    #[derive(Debug)]
    struct HalveEverything;

    impl DecayPolicy for HalveEverything {
        fn decayed_weight(&self, weight: f64, _sample_time: DateTime<Utc>) -> f64 {
            weight / 2.0
        }
    }

    #[test]
    fn test_decay_policy_scales_weights() {
        let mut histogram =
            DecayingHistogram::with_decay(options(100.0), Arc::new(HalveEverything));
        histogram.add_sample(10.0, 3.0, Utc::now());
        assert_eq!(histogram.total_weight(), 1.5);
    }
}
