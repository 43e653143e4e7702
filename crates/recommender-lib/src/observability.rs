//! Observability infrastructure for the recommendation job
//!
//! Provides:
//! - Prometheus metrics (per-workload latency, outcome counters, store writes)
//! - Structured JSON logging with tracing

use chrono::NaiveDate;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-workload processing time (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<JobMetricsInner> = OnceLock::new();

struct JobMetricsInner {
    workload_latency_seconds: Histogram,
    workloads_processed: IntCounter,
    workloads_skipped: IntCounter,
    workloads_failed: IntCounter,
    partial_histograms_saved: IntCounter,
    recommendations_upserted: IntCounter,
    valid_recommendations: IntGauge,
}

impl JobMetricsInner {
    fn new() -> Self {
        Self {
            workload_latency_seconds: register_histogram!(
                "recommender_workload_latency_seconds",
                "Time spent computing one workload's recommendation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register workload_latency_seconds"),

            workloads_processed: register_int_counter!(
                "recommender_workloads_processed_total",
                "Workloads whose recommendation was recomputed"
            )
            .expect("Failed to register workloads_processed"),

            workloads_skipped: register_int_counter!(
                "recommender_workloads_skipped_total",
                "Workloads skipped for missing allocation or layout changes"
            )
            .expect("Failed to register workloads_skipped"),

            workloads_failed: register_int_counter!(
                "recommender_workloads_failed_total",
                "Workloads that failed with an error"
            )
            .expect("Failed to register workloads_failed"),

            partial_histograms_saved: register_int_counter!(
                "recommender_partial_histograms_saved_total",
                "Daily partial histograms written to the store"
            )
            .expect("Failed to register partial_histograms_saved"),

            recommendations_upserted: register_int_counter!(
                "recommender_recommendations_upserted_total",
                "Recommendations written to the store"
            )
            .expect("Failed to register recommendations_upserted"),

            valid_recommendations: register_int_gauge!(
                "recommender_valid_recommendations",
                "Valid recommendations produced by the last run"
            )
            .expect("Failed to register valid_recommendations"),
        }
    }
}

/// Job metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct JobMetrics {
    _private: (),
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JobMetrics")
    }
}

impl JobMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(JobMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &JobMetricsInner {
        GLOBAL_METRICS.get_or_init(JobMetricsInner::new)
    }

    pub fn observe_workload_latency(&self, duration_secs: f64) {
        self.inner().workload_latency_seconds.observe(duration_secs);
    }

    pub fn inc_workloads_processed(&self) {
        self.inner().workloads_processed.inc();
    }

    pub fn inc_workloads_skipped(&self) {
        self.inner().workloads_skipped.inc();
    }

    pub fn inc_workloads_failed(&self) {
        self.inner().workloads_failed.inc();
    }

    pub fn inc_partial_histograms_saved(&self) {
        self.inner().partial_histograms_saved.inc();
    }

    pub fn inc_recommendations_upserted(&self) {
        self.inner().recommendations_upserted.inc();
    }

    pub fn set_valid_recommendations(&self, count: i64) {
        self.inner().valid_recommendations.set(count);
    }

    /// Default registry in the Prometheus text exposition format
    pub fn render_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for job events
///
/// Every event carries the account being processed.
#[derive(Debug, Clone)]
pub struct JobLogger {
    account_id: String,
}

impl JobLogger {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
        }
    }

    pub fn log_job_started(&self, day: NaiveDate, workloads: usize) {
        info!(
            event = "job_started",
            account_id = %self.account_id,
            day = %day,
            workloads = workloads,
            "Recommendation job started"
        );
    }

    pub fn log_job_finished(
        &self,
        day: NaiveDate,
        processed: usize,
        skipped: usize,
        failed: usize,
    ) {
        info!(
            event = "job_finished",
            account_id = %self.account_id,
            day = %day,
            processed = processed,
            skipped = skipped,
            failed = failed,
            "Recommendation job finished"
        );
    }

    pub fn log_workload_skipped(&self, workload: &str, reason: &str) {
        info!(
            event = "workload_skipped",
            account_id = %self.account_id,
            workload = %workload,
            reason = %reason,
            "Skipping workload"
        );
    }

    pub fn log_workload_failed(&self, workload: &str, error: &str, retryable: bool) {
        warn!(
            event = "workload_failed",
            account_id = %self.account_id,
            workload = %workload,
            error = %error,
            retryable = retryable,
            "Workload recommendation failed"
        );
    }

    pub fn log_recommendation(
        &self,
        workload: &str,
        num_days: usize,
        recommended_cpu: Option<f64>,
        recommended_memory: Option<f64>,
        monthly_savings: Option<f64>,
        valid: bool,
    ) {
        info!(
            event = "recommendation_computed",
            account_id = %self.account_id,
            workload = %workload,
            num_days = num_days,
            recommended_cpu = ?recommended_cpu,
            recommended_memory = ?recommended_memory,
            monthly_savings = ?monthly_savings,
            valid = valid,
            "Computed recommendation"
        );
    }

    pub fn log_cost_unavailable(&self, workload: &str, reason: &str) {
        info!(
            event = "cost_unavailable",
            account_id = %self.account_id,
            workload = %workload,
            reason = %reason,
            "Recommendation stored as invalid"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_metrics_handles_share_registry() {
        let metrics = JobMetrics::new();
        let other = metrics.clone();

        metrics.observe_workload_latency(0.01);
        metrics.inc_workloads_processed();
        other.inc_partial_histograms_saved();
        other.set_valid_recommendations(3);
    }

    #[test]
    fn test_render_text_exposes_job_metrics() {
        let metrics = JobMetrics::new();
        metrics.inc_workloads_skipped();

        let text = metrics.render_text().unwrap();
        assert!(text.contains("recommender_workloads_skipped_total"));
        assert!(text.contains("# TYPE recommender_workload_latency_seconds histogram"));
    }

    #[test]
    fn test_cost_unavailable_logged_with_reason() {
        let logger = JobLogger::new("acct-1");
        let reason = crate::error::RecommendationError::CostDataUnavailable {
            workload_id: "svc/web".to_string(),
        };
        logger.log_cost_unavailable("c:svc/web", &reason.to_string());
        assert_eq!(reason.kind(), "cost_data_unavailable");
    }

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new("acct-1");
        assert_eq!(logger.account_id, "acct-1");
    }
}
