//! Per-workload outcomes of a pipeline run

use crate::error::RecommendationError;
use crate::models::WorkloadRef;
use chrono::NaiveDate;
use serde::Serialize;

/// What happened to one workload during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkloadOutcome {
    Computed {
        valid_recommendation: bool,
        monthly_savings: Option<f64>,
        num_days: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        kind: &'static str,
        error: String,
        retryable: bool,
    },
}

impl WorkloadOutcome {
    pub fn failed(error: &RecommendationError) -> Self {
        Self::Failed {
            kind: error.kind(),
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadReport {
    pub workload: WorkloadRef,
    pub outcome: WorkloadOutcome,
}

/// Result of processing one day for one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub account_id: String,
    pub day: NaiveDate,
    /// Sorted by workload
    pub workloads: Vec<WorkloadReport>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, WorkloadOutcome::Computed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, WorkloadOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, WorkloadOutcome::Failed { .. }))
    }

    pub fn valid_recommendations(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                WorkloadOutcome::Computed {
                    valid_recommendation: true,
                    ..
                }
            )
        })
    }

    /// Workloads worth including in a retry of the same day
    pub fn retryable_workloads(&self) -> Vec<WorkloadRef> {
        self.workloads
            .iter()
            .filter(|r| matches!(r.outcome, WorkloadOutcome::Failed { retryable: true, .. }))
            .map(|r| r.workload.clone())
            .collect()
    }

    pub fn outcome(&self, workload: &WorkloadRef) -> Option<&WorkloadOutcome> {
        self.workloads
            .iter()
            .find(|r| &r.workload == workload)
            .map(|r| &r.outcome)
    }

    fn count(&self, predicate: impl Fn(&WorkloadOutcome) -> bool) -> usize {
        self.workloads
            .iter()
            .filter(|r| predicate(&r.outcome))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_retryable() {
        let transient =
            RecommendationError::transient("upsert recommendation", anyhow::anyhow!("down"));
        let report = RunReport {
            account_id: "acct".to_string(),
            day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            workloads: vec![
                WorkloadReport {
                    workload: WorkloadRef::new("c", "a"),
                    outcome: WorkloadOutcome::Computed {
                        valid_recommendation: true,
                        monthly_savings: Some(12.5),
                        num_days: 7,
                    },
                },
                WorkloadReport {
                    workload: WorkloadRef::new("c", "b"),
                    outcome: WorkloadOutcome::Skipped {
                        reason: "no allocation".to_string(),
                    },
                },
                WorkloadReport {
                    workload: WorkloadRef::new("c", "d"),
                    outcome: WorkloadOutcome::failed(&transient),
                },
            ],
        };

        assert_eq!(report.processed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.valid_recommendations(), 1);
        assert_eq!(
            report.retryable_workloads(),
            vec![WorkloadRef::new("c", "d")]
        );
    }
}
