//! Core data models for the recommendation engine

use crate::histogram::HistogramCheckpoint;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version written into every partial histogram record
pub const PARTIAL_RECORD_VERSION: u32 = 1;

/// Schema version written into every recommendation
pub const RECOMMENDATION_VERSION: u32 = 1;

/// Resource dimension being sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Cpu, ResourceKind::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource amounts keyed by kind, in the workload's allocation units
/// (CPU units and memory MB). A missing key means "unknown", not zero.
pub type ResourceMap = BTreeMap<ResourceKind, f64>;

/// Build a resource map with both CPU and memory present
pub fn resource_map(cpu: f64, memory: f64) -> ResourceMap {
    let mut map = ResourceMap::new();
    map.insert(ResourceKind::Cpu, cpu);
    map.insert(ResourceKind::Memory, memory);
    map
}

/// Identity of a workload within an account
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub cluster_id: String,
    /// ARN-like path; the last segment is the service name
    pub workload_id: String,
}

impl WorkloadRef {
    pub fn new(cluster_id: impl Into<String>, workload_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            workload_id: workload_id.into(),
        }
    }

    /// Human-readable service name
    pub fn name(&self) -> &str {
        self.workload_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.workload_id)
    }

    /// Deterministic recommendation id, stable across reruns
    pub fn recommendation_id(&self, account_id: &str) -> String {
        format!("{}/{}/{}", account_id, self.cluster_id, self.workload_id)
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster_id, self.workload_id)
    }
}

/// One utilization observation interval for a workload/resource.
///
/// Utilization fractions are relative to the capacity allocated at sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub workload_id: String,
    pub resource: ResourceKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub avg_utilization: f64,
    pub max_utilization: f64,
}

/// Currently allocated capacity of a workload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub cpu_units: f64,
    pub memory_units: f64,
}

impl Allocation {
    pub fn units(&self, resource: ResourceKind) -> f64 {
        match resource {
            ResourceKind::Cpu => self.cpu_units,
            ResourceKind::Memory => self.memory_units,
        }
    }

    pub fn as_resource_map(&self) -> ResourceMap {
        resource_map(self.cpu_units, self.memory_units)
    }
}

/// Billing cost of one day split by resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
}

impl Cost {
    pub fn get(&self, resource: ResourceKind) -> Option<f64> {
        match resource {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
        }
    }

    /// Sum of the known components, `None` when both are unknown
    pub fn total(&self) -> Option<f64> {
        match (self.cpu, self.memory) {
            (None, None) => None,
            (cpu, memory) => Some(cpu.unwrap_or(0.0) + memory.unwrap_or(0.0)),
        }
    }
}

/// One day's histogram contribution for one workload and resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialHistogramRecord {
    pub account_id: String,
    pub workload: WorkloadRef,
    pub resource: ResourceKind,
    pub day: NaiveDate,
    pub histogram: HistogramCheckpoint,
    pub total_samples_count: usize,
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    /// Largest absolute usage observed during the day
    pub peak: f64,
    pub version: u32,
}

/// Current rightsizing recommendation for a workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub account_id: String,
    pub workload: WorkloadRef,
    pub workload_name: String,
    pub cpu_histogram: HistogramCheckpoint,
    pub memory_histogram: HistogramCheckpoint,
    pub current_resources: ResourceMap,
    pub percentile_based: BTreeMap<u8, ResourceMap>,
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub total_samples_count: usize,
    pub memory_peak: f64,
    pub num_days: usize,
    pub last_received_util_data_at: Option<DateTime<Utc>>,
    pub last_computed_recommendation_at: DateTime<Utc>,
    pub last_day_cost: Option<Cost>,
    pub last_day_cost_available: bool,
    pub estimated_savings: Option<f64>,
    pub valid_recommendation: bool,
    pub ttl: DateTime<Utc>,
    pub dirty: bool,
    pub version: u32,
}

/// Lightweight listing row kept alongside each recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub id: String,
    pub account_id: String,
    pub cluster_id: String,
    pub workload_name: String,
    pub monthly_cost: Option<f64>,
    pub monthly_savings: Option<f64>,
    pub should_show: bool,
    pub last_received_util_data_at: Option<DateTime<Utc>>,
}
