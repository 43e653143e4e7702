//! Daily partial histogram construction
//!
//! Turns one day's utilization samples for a workload/resource into a
//! persisted histogram contribution. Every sample is recorded twice: the
//! average reading at a higher weight than the peak reading, so sustained
//! usage dominates while short spikes still pull the distribution up.

use crate::config::RecommenderConfig;
use crate::error::Result;
use crate::histogram::{DecayPolicy, DecayingHistogram, HistogramOptions, NoDecay};
use crate::models::{
    PartialHistogramRecord, ResourceKind, UtilizationSample, WorkloadRef, PARTIAL_RECORD_VERSION,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Builds one `PartialHistogramRecord` per (workload, resource, day)
#[derive(Debug, Clone)]
pub struct PartialHistogramBuilder {
    bucket_count: usize,
    epsilon: f64,
    avg_utilization_weight: f64,
    max_utilization_weight: f64,
    decay: Arc<dyn DecayPolicy>,
}

impl PartialHistogramBuilder {
    pub fn new(config: &RecommenderConfig) -> Self {
        Self {
            bucket_count: config.bucket_count,
            epsilon: config.epsilon,
            avg_utilization_weight: config.avg_utilization_weight,
            max_utilization_weight: config.max_utilization_weight,
            decay: Arc::new(NoDecay),
        }
    }

    pub fn with_decay(mut self, decay: Arc<dyn DecayPolicy>) -> Self {
        self.decay = decay;
        self
    }

    /// Bucket layout spanning `[0, allocated_units]`
    pub fn options_for(&self, allocated_units: f64) -> Result<HistogramOptions> {
        HistogramOptions::new(allocated_units, self.bucket_count, self.epsilon)
    }

    /// Histogram of absolute usage for the given samples
    pub fn build_histogram(
        &self,
        samples: &[UtilizationSample],
        allocated_units: f64,
    ) -> Result<DecayingHistogram> {
        let options = self.options_for(allocated_units)?;
        let mut histogram = DecayingHistogram::with_decay(options, self.decay.clone());

        for sample in samples {
            histogram.add_sample(
                sample.avg_utilization * allocated_units,
                self.avg_utilization_weight,
                sample.start_time,
            );
            histogram.add_sample(
                sample.max_utilization * allocated_units,
                self.max_utilization_weight,
                sample.start_time,
            );
        }
        Ok(histogram)
    }

    /// Build the record for one day; samples of other resources are ignored
    pub fn build(
        &self,
        account_id: &str,
        workload: &WorkloadRef,
        resource: ResourceKind,
        day: NaiveDate,
        samples: &[UtilizationSample],
        allocated_units: f64,
    ) -> Result<PartialHistogramRecord> {
        let samples: Vec<UtilizationSample> = samples
            .iter()
            .filter(|s| s.resource == resource)
            .cloned()
            .collect();

        let histogram = self.build_histogram(&samples, allocated_units)?;

        let first_sample_start = samples.iter().map(|s| s.start_time).min();
        let last_sample_start = samples.iter().map(|s| s.start_time).max();
        let window_end = samples.iter().map(|s| s.end_time).max();
        let peak = samples
            .iter()
            .map(|s| s.max_utilization * allocated_units)
            .fold(0.0, f64::max);

        debug!(
            workload = %workload,
            resource = %resource,
            day = %day,
            samples = samples.len(),
            total_weight = histogram.total_weight(),
            "Built partial histogram"
        );

        Ok(PartialHistogramRecord {
            account_id: account_id.to_string(),
            workload: workload.clone(),
            resource,
            day,
            histogram: histogram.save_checkpoint(),
            total_samples_count: samples.len(),
            first_sample_start,
            last_sample_start,
            window_end,
            peak,
            version: PARTIAL_RECORD_VERSION,
        })
    }
}
