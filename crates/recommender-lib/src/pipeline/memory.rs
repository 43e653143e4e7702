//! In-memory collaborators
//!
//! Backed by snapshots loaded up front (sources) or concurrent maps
//! (stores). Used by the daily job binary and tests.

use super::sources::{
    AllocationSource, CostLedger, HistogramStore, RecommendationIndex, RecommendationStore,
    UtilizationByWorkload, UtilizationSource,
};
use crate::models::{
    Allocation, Cost, PartialHistogramRecord, Recommendation, RecommendationSummary, ResourceKind,
    UtilizationSample, WorkloadRef,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

type RecordKey = (String, WorkloadRef, ResourceKind, NaiveDate);

/// Partial histogram store keyed by (account, workload, resource, day)
#[derive(Debug, Default)]
pub struct InMemoryHistogramStore {
    records: DashMap<RecordKey, PartialHistogramRecord>,
}

impl InMemoryHistogramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(
        &self,
        account_id: &str,
        workload: &WorkloadRef,
        resource: ResourceKind,
        day: NaiveDate,
    ) -> Option<PartialHistogramRecord> {
        self.records
            .get(&(account_id.to_string(), workload.clone(), resource, day))
            .map(|r| r.clone())
    }
}

#[async_trait]
impl HistogramStore for InMemoryHistogramStore {
    async fn save(&self, record: &PartialHistogramRecord) -> Result<()> {
        let key = (
            record.account_id.clone(),
            record.workload.clone(),
            record.resource,
            record.day,
        );
        self.records.insert(key, record.clone());
        Ok(())
    }

    async fn fetch_trailing(
        &self,
        account_id: &str,
        workload: &WorkloadRef,
        resource: ResourceKind,
        from_day: NaiveDate,
        to_day: NaiveDate,
    ) -> Result<Vec<PartialHistogramRecord>> {
        let mut records: Vec<PartialHistogramRecord> = self
            .records
            .iter()
            .filter(|entry| {
                let (account, w, r, day) = entry.key();
                account == account_id
                    && w == workload
                    && *r == resource
                    && *day >= from_day
                    && *day <= to_day
            })
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.day);
        Ok(records)
    }
}

/// Recommendation store that also serves as the listing index
#[derive(Debug, Default)]
pub struct InMemoryRecommendationStore {
    recommendations: DashMap<String, Recommendation>,
    summaries: DashMap<String, RecommendationSummary>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Recommendation> {
        self.recommendations.get(id).map(|r| r.clone())
    }

    pub fn summary(&self, id: &str) -> Option<RecommendationSummary> {
        self.summaries.get(id).map(|s| s.clone())
    }

    /// All recommendations sorted by id
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut all: Vec<Recommendation> = self
            .recommendations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }
}

#[async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn upsert(&self, recommendation: &Recommendation) -> Result<()> {
        self.recommendations
            .insert(recommendation.id.clone(), recommendation.clone());
        Ok(())
    }
}

#[async_trait]
impl RecommendationIndex for InMemoryRecommendationStore {
    async fn upsert_summary(&self, summary: &RecommendationSummary) -> Result<()> {
        self.summaries.insert(summary.id.clone(), summary.clone());
        Ok(())
    }
}

/// Utilization snapshot, filtered by day on fetch
#[derive(Debug, Clone, Default)]
pub struct StaticUtilizationSource {
    samples: HashMap<WorkloadRef, Vec<UtilizationSample>>,
}

impl StaticUtilizationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(mut self, workload: WorkloadRef, samples: Vec<UtilizationSample>) -> Self {
        self.samples.entry(workload).or_default().extend(samples);
        self
    }
}

#[async_trait]
impl UtilizationSource for StaticUtilizationSource {
    async fn fetch(
        &self,
        _account_id: &str,
        workloads: &[WorkloadRef],
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<UtilizationByWorkload> {
        let mut result = UtilizationByWorkload::new();
        for workload in workloads {
            let Some(samples) = self.samples.get(workload) else {
                continue;
            };
            for sample in samples
                .iter()
                .filter(|s| s.start_time >= day_start && s.start_time < day_end)
            {
                result
                    .entry((workload.clone(), sample.resource))
                    .or_default()
                    .push(sample.clone());
            }
        }
        for samples in result.values_mut() {
            samples.sort_by_key(|s| s.start_time);
        }
        Ok(result)
    }
}

/// Fixed allocation table
#[derive(Debug, Clone, Default)]
pub struct StaticAllocationSource {
    allocations: HashMap<WorkloadRef, Allocation>,
}

impl StaticAllocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocation(mut self, workload: WorkloadRef, allocation: Allocation) -> Self {
        self.allocations.insert(workload, allocation);
        self
    }
}

#[async_trait]
impl AllocationSource for StaticAllocationSource {
    async fn fetch(
        &self,
        _account_id: &str,
        workloads: &[WorkloadRef],
    ) -> Result<HashMap<WorkloadRef, Allocation>> {
        Ok(workloads
            .iter()
            .filter_map(|w| self.allocations.get(w).map(|a| (w.clone(), *a)))
            .collect())
    }
}

/// Fixed last-day cost table
#[derive(Debug, Clone, Default)]
pub struct StaticCostLedger {
    costs: HashMap<WorkloadRef, Cost>,
}

impl StaticCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(mut self, workload: WorkloadRef, cost: Cost) -> Self {
        self.costs.insert(workload, cost);
        self
    }
}

#[async_trait]
impl CostLedger for StaticCostLedger {
    async fn last_available_day_cost(
        &self,
        _account_id: &str,
        workload: &WorkloadRef,
        _since_day: NaiveDate,
    ) -> Result<Option<Cost>> {
        Ok(self.costs.get(workload).copied())
    }
}
