//! External collaborators of the pipeline
//!
//! Each trait is a thin I/O boundary. Implementations report failures as
//! plain errors; the pipeline classifies them as transient and leaves
//! retrying to whoever scheduled the run.

use crate::models::{
    Allocation, Cost, PartialHistogramRecord, Recommendation, RecommendationSummary, ResourceKind,
    UtilizationSample, WorkloadRef,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

/// Samples for a batch, keyed by workload and resource, ordered by start time
pub type UtilizationByWorkload = HashMap<(WorkloadRef, ResourceKind), Vec<UtilizationSample>>;

/// Source of per-interval utilization readings
#[async_trait]
pub trait UtilizationSource: Send + Sync {
    async fn fetch(
        &self,
        account_id: &str,
        workloads: &[WorkloadRef],
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<UtilizationByWorkload>;
}

/// Source of current allocated capacity
#[async_trait]
pub trait AllocationSource: Send + Sync {
    async fn fetch(
        &self,
        account_id: &str,
        workloads: &[WorkloadRef],
    ) -> Result<HashMap<WorkloadRef, Allocation>>;
}

/// Persistence for daily partial histograms
#[async_trait]
pub trait HistogramStore: Send + Sync {
    /// Insert or overwrite the record for its (workload, resource, day)
    async fn save(&self, record: &PartialHistogramRecord) -> Result<()>;

    /// Records with `from_day <= day <= to_day`, ordered by day
    async fn fetch_trailing(
        &self,
        account_id: &str,
        workload: &WorkloadRef,
        resource: ResourceKind,
        from_day: NaiveDate,
        to_day: NaiveDate,
    ) -> Result<Vec<PartialHistogramRecord>>;
}

/// Billing data lookup
#[async_trait]
pub trait CostLedger: Send + Sync {
    /// Cost of the most recent billed day on or after `since_day`
    async fn last_available_day_cost(
        &self,
        account_id: &str,
        workload: &WorkloadRef,
        since_day: NaiveDate,
    ) -> Result<Option<Cost>>;
}

/// Persistence for full recommendations
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn upsert(&self, recommendation: &Recommendation) -> Result<()>;
}

/// Listing index of recommendation summaries
#[async_trait]
pub trait RecommendationIndex: Send + Sync {
    async fn upsert_summary(&self, summary: &RecommendationSummary) -> Result<()>;
}
