//! Rolling-window merge of partial histograms
//!
//! The aggregate is laid out over the workload's current allocation so
//! percentile values come out in the same absolute units as today's
//! allocation. Merging is plain addition, so the result does not depend on
//! the order in which days are visited.

use crate::config::RecommenderConfig;
use crate::error::Result;
use crate::histogram::{DecayingHistogram, HistogramOptions};
use crate::models::{resource_map, Allocation, PartialHistogramRecord, ResourceKind, ResourceMap};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Merged view of a trailing window of partial histograms
#[derive(Debug, Clone)]
pub struct AggregatedWindow {
    pub cpu_histogram: DecayingHistogram,
    pub memory_histogram: DecayingHistogram,
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub total_samples_count: usize,
    pub memory_peak: f64,
    /// Days that actually contributed, may be fewer than the window length
    pub num_days: usize,
    pub percentiles: BTreeMap<u8, ResourceMap>,
}

impl AggregatedWindow {
    /// Resource values at a computed percentile
    pub fn recommended(&self, percentile: u8) -> Option<&ResourceMap> {
        self.percentiles.get(&percentile)
    }
}

/// Merges daily records into one rolling recommendation draft
#[derive(Debug, Clone)]
pub struct RecommendationAggregator {
    bucket_count: usize,
    epsilon: f64,
    percentiles: Vec<u8>,
}

impl RecommendationAggregator {
    pub fn new(config: &RecommenderConfig) -> Self {
        Self {
            bucket_count: config.bucket_count,
            epsilon: config.epsilon,
            percentiles: config.percentiles.clone(),
        }
    }

    fn options_for(&self, allocated_units: f64) -> Result<HistogramOptions> {
        HistogramOptions::new(allocated_units, self.bucket_count, self.epsilon)
    }

    /// Merge CPU and memory records of any number of days.
    ///
    /// Fails with `ConfigMismatch` when a record was built under an
    /// allocation different from `allocation`.
    pub fn aggregate(
        &self,
        allocation: &Allocation,
        records: &[PartialHistogramRecord],
    ) -> Result<AggregatedWindow> {
        let cpu_options = self.options_for(allocation.cpu_units)?;
        let memory_options = self.options_for(allocation.memory_units)?;
        let mut cpu_histogram = DecayingHistogram::new(cpu_options);
        let mut memory_histogram = DecayingHistogram::new(memory_options);

        let mut first_sample_start: Option<DateTime<Utc>> = None;
        let mut last_sample_start: Option<DateTime<Utc>> = None;
        let mut window_end: Option<DateTime<Utc>> = None;
        let mut memory_peak: f64 = 0.0;
        // CPU and memory are sampled over the same intervals, so a day
        // counts its samples once.
        let mut samples_per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

        for record in records {
            let (running, options) = match record.resource {
                ResourceKind::Cpu => (&mut cpu_histogram, cpu_options),
                ResourceKind::Memory => (&mut memory_histogram, memory_options),
            };
            let mut scratch = DecayingHistogram::new(options);
            scratch.load_checkpoint(&record.histogram)?;
            running.merge(&scratch)?;

            first_sample_start = min_opt(first_sample_start, record.first_sample_start);
            last_sample_start = max_opt(last_sample_start, record.last_sample_start);
            window_end = max_opt(window_end, record.window_end);
            if record.resource == ResourceKind::Memory {
                memory_peak = memory_peak.max(record.peak);
            }

            let day_count = samples_per_day.entry(record.day).or_insert(0);
            *day_count = (*day_count).max(record.total_samples_count);
        }

        let percentiles = self
            .percentiles
            .iter()
            .map(|p| {
                let value = *p as f64;
                (
                    *p,
                    resource_map(
                        cpu_histogram.percentile(value),
                        memory_histogram.percentile(value),
                    ),
                )
            })
            .collect();

        Ok(AggregatedWindow {
            cpu_histogram,
            memory_histogram,
            first_sample_start,
            last_sample_start,
            window_end,
            total_samples_count: samples_per_day.values().sum(),
            memory_peak,
            num_days: samples_per_day.len(),
            percentiles,
        })
    }
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PartialHistogramBuilder;
    use crate::error::RecommendationError;
    use crate::models::{UtilizationSample, WorkloadRef};
    use chrono::{Duration, TimeZone};

    const CPU_UNITS: f64 = 1024.0;
    const MEMORY_UNITS: f64 = 2048.0;

    fn allocation() -> Allocation {
        Allocation {
            cpu_units: CPU_UNITS,
            memory_units: MEMORY_UNITS,
        }
    }

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() + Duration::days(offset)
    }

    fn samples_for(
        day: NaiveDate,
        resource: ResourceKind,
        count: u32,
        level: f64,
    ) -> Vec<UtilizationSample> {
        let midnight = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap());
        (0..count)
            .map(|h| UtilizationSample {
                workload_id: "svc/api".to_string(),
                resource,
                start_time: midnight + Duration::hours(h as i64),
                end_time: midnight + Duration::hours(h as i64 + 1),
                avg_utilization: level,
                max_utilization: (level * 1.5).min(1.0),
            })
            .collect()
    }

    fn records_for_days(days: &[(i64, u32, f64)]) -> Vec<PartialHistogramRecord> {
        let config = RecommenderConfig::default();
        let builder = PartialHistogramBuilder::new(&config);
        let workload = WorkloadRef::new("cluster", "svc/api");
        let mut records = Vec::new();
        for (offset, count, level) in days {
            for resource in ResourceKind::ALL {
                let units = allocation().units(resource);
                let samples = samples_for(day(*offset), resource, *count, *level);
                records.push(
                    builder
                        .build("acct", &workload, resource, day(*offset), &samples, units)
                        .unwrap(),
                );
            }
        }
        records
    }

    #[test]
    fn test_partial_window_counts_present_days() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let records = records_for_days(&[(0, 24, 0.2), (1, 24, 0.3), (2, 12, 0.4)]);

        let window = aggregator.aggregate(&allocation(), &records).unwrap();
        assert_eq!(window.num_days, 3);
        assert_eq!(window.total_samples_count, 60);
        assert_eq!(window.percentiles.len(), 5);
        assert!(window.recommended(90).is_some());
        assert_eq!(
            window.first_sample_start,
            Some(Utc.from_utc_datetime(&day(0).and_hms_opt(0, 0, 0).unwrap()))
        );
        assert_eq!(
            window.window_end,
            Some(Utc.from_utc_datetime(&day(2).and_hms_opt(12, 0, 0).unwrap()))
        );
        assert!((window.memory_peak - 0.6 * MEMORY_UNITS).abs() < 1e-9);
    }

    #[test]
    fn test_order_independent() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let records = records_for_days(&[(0, 24, 0.1), (1, 20, 0.5), (2, 8, 0.9), (3, 24, 0.3)]);
        let mut reversed = records.clone();
        reversed.reverse();
        let mut rotated = records.clone();
        rotated.rotate_left(3);

        let a = aggregator.aggregate(&allocation(), &records).unwrap();
        let b = aggregator.aggregate(&allocation(), &reversed).unwrap();
        let c = aggregator.aggregate(&allocation(), &rotated).unwrap();

        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.percentiles, c.percentiles);
        assert_eq!(a.total_samples_count, b.total_samples_count);
        assert_eq!(a.first_sample_start, c.first_sample_start);
        assert_eq!(
            a.cpu_histogram.bucket_weights(),
            b.cpu_histogram.bucket_weights()
        );
    }

    #[test]
    fn test_all_empty_days() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let records = records_for_days(&[(0, 0, 0.0), (1, 0, 0.0)]);

        let window = aggregator.aggregate(&allocation(), &records).unwrap();
        assert_eq!(window.total_samples_count, 0);
        assert_eq!(window.num_days, 2);
        assert_eq!(window.first_sample_start, None);
        for values in window.percentiles.values() {
            assert!(values[&ResourceKind::Cpu].is_finite());
            assert!(values[&ResourceKind::Memory].is_finite());
        }
    }

    #[test]
    fn test_no_records_yields_uninformative_window() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let window = aggregator.aggregate(&allocation(), &[]).unwrap();
        assert_eq!(window.num_days, 0);
        assert_eq!(window.total_samples_count, 0);
        assert!(window.cpu_histogram.is_empty());
    }

    #[test]
    fn test_allocation_change_is_config_mismatch() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let records = records_for_days(&[(0, 4, 0.5)]);
        let resized = Allocation {
            cpu_units: 512.0,
            memory_units: MEMORY_UNITS,
        };
        let err = aggregator.aggregate(&resized, &records).unwrap_err();
        assert!(matches!(err, RecommendationError::ConfigMismatch { .. }));
    }

    #[test]
    fn test_percentiles_track_usage_level() {
        let aggregator = RecommendationAggregator::new(&RecommenderConfig::default());
        let records = records_for_days(&[(0, 24, 0.25)]);
        let window = aggregator.aggregate(&allocation(), &records).unwrap();

        // Within one bucket either way
        let tolerance = 2.0 * CPU_UNITS / 1000.0;
        let p50 = window.recommended(50).unwrap();
        assert!((p50[&ResourceKind::Cpu] - 0.25 * CPU_UNITS).abs() <= tolerance);
        let p99 = window.recommended(99).unwrap();
        assert!((p99[&ResourceKind::Cpu] - 0.375 * CPU_UNITS).abs() <= tolerance);
    }
}
