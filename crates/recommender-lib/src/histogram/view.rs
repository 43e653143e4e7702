//! Compact presentation of a histogram for detail screens

use super::DecayingHistogram;
use serde::{Deserialize, Serialize};

/// Histogram with empty leading/trailing buckets stripped and
/// percentiles 0..=100 precomputed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramView {
    pub num_buckets: usize,
    pub bucket_size: f64,
    /// First bucket holding recorded weight, `None` for an empty histogram
    pub min_bucket: Option<usize>,
    pub max_bucket: Option<usize>,
    /// Weights of buckets `min_bucket..=max_bucket`
    pub bucket_weights: Vec<f64>,
    pub total_weight: f64,
    /// `precomputed[p]` is the p-th percentile
    pub precomputed: Vec<f64>,
}

impl HistogramView {
    pub fn from_histogram(histogram: &DecayingHistogram) -> Self {
        let weights = histogram.bucket_weights();
        let min_bucket = weights.iter().position(|w| *w > 0.0);
        let max_bucket = weights.iter().rposition(|w| *w > 0.0);

        let bucket_weights = match (min_bucket, max_bucket) {
            (Some(lo), Some(hi)) => weights[lo..=hi].to_vec(),
            _ => Vec::new(),
        };

        Self {
            num_buckets: histogram.options().bucket_count(),
            bucket_size: histogram.options().bucket_size(),
            min_bucket,
            max_bucket,
            bucket_weights,
            total_weight: histogram.total_weight(),
            precomputed: (0..=100u32)
                .map(|p| histogram.percentile(p as f64))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramOptions;
    use chrono::Utc;

    #[test]
    fn test_strips_empty_edges() {
        let mut histogram =
            DecayingHistogram::new(HistogramOptions::new(100.0, 100, 0.0001).unwrap());
        let now = Utc::now();
        histogram.add_sample(20.0, 1.0, now);
        histogram.add_sample(25.0, 2.0, now);

        let view = HistogramView::from_histogram(&histogram);
        assert_eq!(view.min_bucket, Some(20));
        assert_eq!(view.max_bucket, Some(25));
        assert_eq!(view.bucket_weights.len(), 6);
        assert_eq!(view.bucket_weights[0], 1.0);
        assert_eq!(view.bucket_weights[5], 2.0);
        assert_eq!(view.total_weight, 3.0);
        assert_eq!(view.precomputed.len(), 101);
    }

    #[test]
    fn test_empty_view() {
        let histogram =
            DecayingHistogram::new(HistogramOptions::new(100.0, 100, 0.0001).unwrap());
        let view = HistogramView::from_histogram(&histogram);
        assert_eq!(view.min_bucket, None);
        assert!(view.bucket_weights.is_empty());
        assert!(view.precomputed.windows(2).all(|w| w[0] <= w[1]));
    }
}
