//! Input snapshot for one account
//!
//! The job's collaborators are served from a JSON document holding each
//! workload's allocation, last-day cost and utilization samples, plus the
//! partial histograms stored by earlier runs.

use anyhow::{Context, Result};
use recommender_lib::pipeline::{
    HistogramStore, InMemoryHistogramStore, InMemoryRecommendationStore, StaticAllocationSource,
    StaticCostLedger, StaticUtilizationSource,
};
use recommender_lib::{
    Allocation, Collaborators, Cost, PartialHistogramRecord, UtilizationSample, WorkloadRef,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSnapshot {
    #[serde(default)]
    pub workloads: Vec<WorkloadInput>,

    /// Partial histograms persisted by earlier days' runs
    #[serde(default)]
    pub history: Vec<PartialHistogramRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadInput {
    pub cluster_id: String,
    pub workload_id: String,

    #[serde(default)]
    pub allocation: Option<Allocation>,

    #[serde(default)]
    pub last_day_cost: Option<Cost>,

    #[serde(default)]
    pub samples: Vec<UtilizationSample>,
}

impl WorkloadInput {
    pub fn workload_ref(&self) -> WorkloadRef {
        WorkloadRef::new(self.cluster_id.clone(), self.workload_id.clone())
    }
}

/// Collaborators wired up from a snapshot, with handles on the stores
pub struct LoadedSnapshot {
    pub collaborators: Collaborators,
    pub histograms: Arc<InMemoryHistogramStore>,
    pub recommendations: Arc<InMemoryRecommendationStore>,
}

impl InputSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }

    pub fn workload_refs(&self) -> Vec<WorkloadRef> {
        self.workloads
            .iter()
            .map(WorkloadInput::workload_ref)
            .collect()
    }

    pub async fn into_collaborators(self) -> Result<LoadedSnapshot> {
        let histograms = Arc::new(InMemoryHistogramStore::new());
        for record in &self.history {
            histograms
                .save(record)
                .await
                .context("Failed to seed partial histogram history")?;
        }

        let mut utilization = StaticUtilizationSource::new();
        let mut allocations = StaticAllocationSource::new();
        let mut costs = StaticCostLedger::new();
        for input in self.workloads {
            let workload = input.workload_ref();
            if let Some(allocation) = input.allocation {
                allocations = allocations.with_allocation(workload.clone(), allocation);
            }
            if let Some(cost) = input.last_day_cost {
                costs = costs.with_cost(workload.clone(), cost);
            }
            utilization = utilization.with_samples(workload, input.samples);
        }
        info!(history = histograms.len(), "Loaded input snapshot");

        let recommendations = Arc::new(InMemoryRecommendationStore::new());
        Ok(LoadedSnapshot {
            collaborators: Collaborators {
                utilization: Arc::new(utilization),
                allocations: Arc::new(allocations),
                histograms: histograms.clone(),
                costs: Arc::new(costs),
                recommendations: recommendations.clone(),
                index: recommendations.clone(),
            },
            histograms,
            recommendations,
        })
    }
}
