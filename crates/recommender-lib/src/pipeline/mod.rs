//! Daily recommendation run
//!
//! Workloads are processed in batches: each batch fetches utilization and
//! allocations once, then every workload in it runs as an independent task
//! bounded by the worker pool. A workload's failure is recorded in the
//! run report and never stops its siblings.

mod memory;
mod report;
mod sources;

pub use memory::{
    InMemoryHistogramStore, InMemoryRecommendationStore, StaticAllocationSource, StaticCostLedger,
    StaticUtilizationSource,
};
pub use report::{RunReport, WorkloadOutcome, WorkloadReport};
pub use sources::{
    AllocationSource, CostLedger, HistogramStore, RecommendationIndex, RecommendationStore,
    UtilizationByWorkload, UtilizationSource,
};

use crate::aggregator::RecommendationAggregator;
use crate::builder::PartialHistogramBuilder;
use crate::config::RecommenderConfig;
use crate::error::{RecommendationError, Result};
use crate::histogram::DecayPolicy;
use crate::models::{
    Allocation, PartialHistogramRecord, Recommendation, RecommendationSummary, ResourceKind,
    UtilizationSample, WorkloadRef, RECOMMENDATION_VERSION,
};
use crate::observability::{JobLogger, JobMetrics};
use crate::savings::SavingsEstimator;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// External systems the pipeline reads from and writes to
#[derive(Clone)]
pub struct Collaborators {
    pub utilization: Arc<dyn UtilizationSource>,
    pub allocations: Arc<dyn AllocationSource>,
    pub histograms: Arc<dyn HistogramStore>,
    pub costs: Arc<dyn CostLedger>,
    pub recommendations: Arc<dyn RecommendationStore>,
    pub index: Arc<dyn RecommendationIndex>,
}

/// Orchestrates one day's run for an account
pub struct RecommendationPipeline {
    config: RecommenderConfig,
    builder: PartialHistogramBuilder,
    aggregator: RecommendationAggregator,
    estimator: SavingsEstimator,
    collaborators: Collaborators,
    metrics: JobMetrics,
}

impl RecommendationPipeline {
    pub fn new(config: RecommenderConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            builder: PartialHistogramBuilder::new(&config),
            aggregator: RecommendationAggregator::new(&config),
            estimator: SavingsEstimator::new(),
            config,
            collaborators,
            metrics: JobMetrics::new(),
        })
    }

    /// Use a decay policy other than plain accumulation for new samples
    pub fn with_decay(mut self, decay: Arc<dyn DecayPolicy>) -> Self {
        self.builder = self.builder.with_decay(decay);
        self
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Process `day` for the given workloads, stamping TTLs relative to now
    pub async fn run_day(
        &self,
        account_id: &str,
        day: NaiveDate,
        workloads: &[WorkloadRef],
    ) -> RunReport {
        self.run_day_at(account_id, day, workloads, Utc::now())
            .await
    }

    /// Process `day` with an explicit "now"; reruns with the same inputs
    /// produce the same records apart from now-derived fields
    pub async fn run_day_at(
        &self,
        account_id: &str,
        day: NaiveDate,
        workloads: &[WorkloadRef],
        now: DateTime<Utc>,
    ) -> RunReport {
        let logger = JobLogger::new(account_id);

        // A workload listed twice would save an empty record over its own day.
        let mut unique = workloads.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() < workloads.len() {
            debug!(
                account_id = %account_id,
                duplicates = workloads.len() - unique.len(),
                "Dropped duplicate workloads"
            );
        }
        logger.log_job_started(day, unique.len());

        let mut reports = Vec::with_capacity(unique.len());
        for (index, batch) in unique.chunks(self.config.batch_size).enumerate() {
            debug!(account_id = %account_id, batch = index, size = batch.len(), "Processing batch");
            reports.extend(self.run_batch(account_id, day, batch, now, &logger).await);
        }
        reports.sort_by(|a, b| a.workload.cmp(&b.workload));

        let report = RunReport {
            account_id: account_id.to_string(),
            day,
            workloads: reports,
        };
        self.metrics
            .set_valid_recommendations(report.valid_recommendations() as i64);
        logger.log_job_finished(day, report.processed(), report.skipped(), report.failed());
        report
    }

    async fn run_batch(
        &self,
        account_id: &str,
        day: NaiveDate,
        batch: &[WorkloadRef],
        now: DateTime<Utc>,
        logger: &JobLogger,
    ) -> Vec<WorkloadReport> {
        let day_start = day_start(day);
        let day_end = day_start + Duration::days(1);

        let fetched = async {
            let utilization = self
                .collaborators
                .utilization
                .fetch(account_id, batch, day_start, day_end)
                .await
                .map_err(|e| RecommendationError::transient("fetch utilization", e))?;
            let allocations = self
                .collaborators
                .allocations
                .fetch(account_id, batch)
                .await
                .map_err(|e| RecommendationError::transient("fetch allocations", e))?;
            Ok::<_, RecommendationError>((utilization, allocations))
        }
        .await;

        let (mut utilization, allocations) = match fetched {
            Ok(data) => data,
            Err(e) => {
                return batch
                    .iter()
                    .map(|workload| self.record_failure(workload, &e, logger))
                    .collect();
            }
        };
        info!(
            account_id = %account_id,
            series = utilization.len(),
            allocations = allocations.len(),
            "Fetched batch inputs"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut reports = Vec::with_capacity(batch.len());
        let mut handles = Vec::with_capacity(batch.len());

        for workload in batch {
            let allocation = match allocations.get(workload) {
                Some(a) if a.cpu_units > 0.0 && a.memory_units > 0.0 => *a,
                _ => {
                    let error = RecommendationError::MissingAllocation {
                        workload_id: workload.workload_id.clone(),
                    };
                    reports.push(self.record_skip(workload, &error, logger));
                    continue;
                }
            };

            let task = WorkloadTask {
                account_id: account_id.to_string(),
                workload: workload.clone(),
                day,
                now,
                allocation,
                cpu_samples: utilization
                    .remove(&(workload.clone(), ResourceKind::Cpu))
                    .unwrap_or_default(),
                memory_samples: utilization
                    .remove(&(workload.clone(), ResourceKind::Memory))
                    .unwrap_or_default(),
                config: self.config.clone(),
                builder: self.builder.clone(),
                aggregator: self.aggregator.clone(),
                estimator: self.estimator,
                collaborators: self.collaborators.clone(),
                metrics: self.metrics.clone(),
                logger: logger.clone(),
            };
            let permits = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                task.run().await
            });
            handles.push((workload.clone(), handle));
        }

        for (workload, handle) in handles {
            let report = match handle.await {
                Ok(Ok(outcome)) => {
                    self.metrics.inc_workloads_processed();
                    WorkloadReport { workload, outcome }
                }
                Ok(Err(e @ RecommendationError::ConfigMismatch { .. })) => {
                    self.record_skip(&workload, &e, logger)
                }
                Ok(Err(e)) => self.record_failure(&workload, &e, logger),
                Err(join_error) => {
                    let e = RecommendationError::transient(
                        "workload task",
                        anyhow::anyhow!("task aborted: {}", join_error),
                    );
                    self.record_failure(&workload, &e, logger)
                }
            };
            reports.push(report);
        }
        reports
    }

    fn record_skip(
        &self,
        workload: &WorkloadRef,
        error: &RecommendationError,
        logger: &JobLogger,
    ) -> WorkloadReport {
        let reason = error.to_string();
        logger.log_workload_skipped(&workload.to_string(), &reason);
        self.metrics.inc_workloads_skipped();
        WorkloadReport {
            workload: workload.clone(),
            outcome: WorkloadOutcome::Skipped { reason },
        }
    }

    fn record_failure(
        &self,
        workload: &WorkloadRef,
        error: &RecommendationError,
        logger: &JobLogger,
    ) -> WorkloadReport {
        logger.log_workload_failed(
            &workload.to_string(),
            &error.to_string(),
            error.is_retryable(),
        );
        self.metrics.inc_workloads_failed();
        WorkloadReport {
            workload: workload.clone(),
            outcome: WorkloadOutcome::failed(error),
        }
    }
}

/// Midnight UTC at the start of `day`
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Self-contained unit of work for one workload
struct WorkloadTask {
    account_id: String,
    workload: WorkloadRef,
    day: NaiveDate,
    now: DateTime<Utc>,
    allocation: Allocation,
    cpu_samples: Vec<UtilizationSample>,
    memory_samples: Vec<UtilizationSample>,
    config: RecommenderConfig,
    builder: PartialHistogramBuilder,
    aggregator: RecommendationAggregator,
    estimator: SavingsEstimator,
    collaborators: Collaborators,
    metrics: JobMetrics,
    logger: JobLogger,
}

impl WorkloadTask {
    async fn run(self) -> Result<WorkloadOutcome> {
        let started = Instant::now();
        let outcome = self.compute().await;
        self.metrics
            .observe_workload_latency(started.elapsed().as_secs_f64());
        outcome
    }

    async fn compute(&self) -> Result<WorkloadOutcome> {
        let records = self.build_and_save_today().await?;
        let window_records = self.fetch_window(records).await?;

        let window = self.aggregator.aggregate(&self.allocation, &window_records)?;
        let current = self.allocation.as_resource_map();
        let recommended = window
            .recommended(self.config.savings_percentile)
            .cloned()
            .unwrap_or_default();

        let cost_since = self.day - Duration::days(self.config.window_days as i64);
        let last_day_cost = self
            .collaborators
            .costs
            .last_available_day_cost(&self.account_id, &self.workload, cost_since)
            .await
            .map_err(|e| RecommendationError::transient("fetch last-day cost", e))?;

        let monthly_savings = last_day_cost
            .as_ref()
            .and_then(|cost| self.estimator.monthly_savings(&current, &recommended, cost));
        let valid = monthly_savings.is_some();
        if !valid {
            let reason = RecommendationError::CostDataUnavailable {
                workload_id: self.workload.workload_id.clone(),
            };
            self.logger
                .log_cost_unavailable(&self.workload.to_string(), &reason.to_string());
        }

        let id = self.workload.recommendation_id(&self.account_id);
        let recommendation = Recommendation {
            id: id.clone(),
            account_id: self.account_id.clone(),
            workload: self.workload.clone(),
            workload_name: self.workload.name().to_string(),
            cpu_histogram: window.cpu_histogram.save_checkpoint(),
            memory_histogram: window.memory_histogram.save_checkpoint(),
            current_resources: current,
            percentile_based: window.percentiles.clone(),
            first_sample_start: window.first_sample_start,
            last_sample_start: window.last_sample_start,
            window_end: window.window_end,
            total_samples_count: window.total_samples_count,
            memory_peak: window.memory_peak,
            num_days: window.num_days,
            last_received_util_data_at: window.last_sample_start,
            last_computed_recommendation_at: day_start(self.day),
            // Only a cost that produced savings is kept on the recommendation.
            last_day_cost: last_day_cost.filter(|_| valid),
            last_day_cost_available: valid,
            estimated_savings: monthly_savings,
            valid_recommendation: valid,
            ttl: self.now + Duration::days(self.config.ttl_days),
            dirty: false,
            version: RECOMMENDATION_VERSION,
        };
        self.collaborators
            .recommendations
            .upsert(&recommendation)
            .await
            .map_err(|e| RecommendationError::transient("upsert recommendation", e))?;
        self.metrics.inc_recommendations_upserted();

        let summary = RecommendationSummary {
            id,
            account_id: self.account_id.clone(),
            cluster_id: self.workload.cluster_id.clone(),
            workload_name: recommendation.workload_name.clone(),
            monthly_cost: last_day_cost
                .as_ref()
                .and_then(|cost| self.estimator.monthly_cost(cost)),
            monthly_savings,
            should_show: valid,
            last_received_util_data_at: recommendation.last_received_util_data_at,
        };
        self.collaborators
            .index
            .upsert_summary(&summary)
            .await
            .map_err(|e| RecommendationError::transient("upsert recommendation summary", e))?;

        self.logger.log_recommendation(
            &self.workload.to_string(),
            window.num_days,
            recommended.get(&ResourceKind::Cpu).copied(),
            recommended.get(&ResourceKind::Memory).copied(),
            monthly_savings,
            valid,
        );

        Ok(WorkloadOutcome::Computed {
            valid_recommendation: valid,
            monthly_savings,
            num_days: window.num_days,
        })
    }

    /// Build today's CPU and memory records and persist them, overwriting
    /// any earlier run of the same day
    async fn build_and_save_today(&self) -> Result<Vec<PartialHistogramRecord>> {
        let mut records = Vec::with_capacity(2);
        for (resource, samples) in [
            (ResourceKind::Cpu, &self.cpu_samples),
            (ResourceKind::Memory, &self.memory_samples),
        ] {
            let record = self.builder.build(
                &self.account_id,
                &self.workload,
                resource,
                self.day,
                samples,
                self.allocation.units(resource),
            )?;
            self.collaborators
                .histograms
                .save(&record)
                .await
                .map_err(|e| RecommendationError::transient("save partial histogram", e))?;
            self.metrics.inc_partial_histograms_saved();
            records.push(record);
        }
        Ok(records)
    }

    /// Earlier days of the window plus today's in-hand records
    async fn fetch_window(
        &self,
        today: Vec<PartialHistogramRecord>,
    ) -> Result<Vec<PartialHistogramRecord>> {
        let mut window = Vec::new();
        if self.config.window_days > 1 {
            let from_day = self.day - Duration::days(self.config.window_days as i64 - 1);
            let to_day = self.day - Duration::days(1);
            for resource in ResourceKind::ALL {
                let earlier = self
                    .collaborators
                    .histograms
                    .fetch_trailing(&self.account_id, &self.workload, resource, from_day, to_day)
                    .await
                    .map_err(|e| RecommendationError::transient("fetch partial histograms", e))?;
                window.extend(
                    earlier
                        .into_iter()
                        .filter(|r| r.day >= from_day && r.day <= to_day && r.resource == resource),
                );
            }
        }
        debug!(
            workload = %self.workload,
            earlier_records = window.len(),
            "Fetched trailing window"
        );
        window.extend(today);
        Ok(window)
    }
}
