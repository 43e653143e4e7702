//! Histogram details for an arbitrary date range
//!
//! Detail screens let a user pick their own range instead of the fixed
//! recommendation window; the stored daily records are merged on demand.

use crate::aggregator::RecommendationAggregator;
use crate::error::{RecommendationError, Result};
use crate::histogram::HistogramView;
use crate::models::{Allocation, ResourceKind, WorkloadRef};
use crate::pipeline::HistogramStore;
use chrono::NaiveDate;
use serde::Serialize;

/// CPU and memory distributions of a workload over a date range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationDetails {
    pub workload: WorkloadRef,
    pub from_day: NaiveDate,
    pub to_day: NaiveDate,
    pub num_days: usize,
    pub cpu: HistogramView,
    pub memory: HistogramView,
}

/// Merge stored records of `from_day..=to_day` under `allocation`'s layout
pub async fn load_details(
    store: &dyn HistogramStore,
    aggregator: &RecommendationAggregator,
    account_id: &str,
    workload: &WorkloadRef,
    allocation: &Allocation,
    from_day: NaiveDate,
    to_day: NaiveDate,
) -> Result<RecommendationDetails> {
    let mut records = Vec::new();
    for resource in ResourceKind::ALL {
        let fetched = store
            .fetch_trailing(account_id, workload, resource, from_day, to_day)
            .await
            .map_err(|e| RecommendationError::transient("fetch partial histograms", e))?;
        records.extend(fetched);
    }

    let window = aggregator.aggregate(allocation, &records)?;
    Ok(RecommendationDetails {
        workload: workload.clone(),
        from_day,
        to_day,
        num_days: window.num_days,
        cpu: HistogramView::from_histogram(&window.cpu_histogram),
        memory: HistogramView::from_histogram(&window.memory_histogram),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PartialHistogramBuilder;
    use crate::config::RecommenderConfig;
    use crate::models::UtilizationSample;
    use crate::pipeline::{day_start, InMemoryHistogramStore};
    use chrono::Duration;

    #[tokio::test]
    async fn test_details_merge_selected_range() {
        let config = RecommenderConfig::default();
        let builder = PartialHistogramBuilder::new(&config);
        let aggregator = RecommendationAggregator::new(&config);
        let store = InMemoryHistogramStore::new();
        let workload = WorkloadRef::new("cluster", "svc/web");
        let allocation = Allocation {
            cpu_units: 1000.0,
            memory_units: 1000.0,
        };
        let first = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        for offset in 0..5 {
            let day = first + Duration::days(offset);
            for resource in ResourceKind::ALL {
                let sample = UtilizationSample {
                    workload_id: workload.workload_id.clone(),
                    resource,
                    start_time: day_start(day),
                    end_time: day_start(day) + Duration::hours(1),
                    avg_utilization: 0.1 * (offset + 1) as f64,
                    max_utilization: 0.1 * (offset + 1) as f64,
                };
                let record = builder
                    .build("acct", &workload, resource, day, &[sample], 1000.0)
                    .unwrap();
                store.save(&record).await.unwrap();
            }
        }

        let details = load_details(
            &store,
            &aggregator,
            "acct",
            &workload,
            &allocation,
            first + Duration::days(1),
            first + Duration::days(3),
        )
        .await
        .unwrap();

        assert_eq!(details.num_days, 3);
        assert_eq!(details.cpu.total_weight, 9.0);
        assert_eq!(details.cpu.min_bucket, Some(200));
        assert_eq!(details.cpu.max_bucket, Some(400));
        assert_eq!(details.memory.precomputed.len(), 101);
    }
}
