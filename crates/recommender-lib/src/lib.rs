//! Workload rightsizing recommendation engine
//!
//! This crate provides the core functionality for:
//! - Bounded-memory usage histograms with percentile queries
//! - Daily partial histograms built from utilization samples
//! - Rolling-window aggregation into percentile recommendations
//! - Monthly savings estimation from billing data
//! - A batched, per-workload fault-isolated daily pipeline

pub mod aggregator;
pub mod builder;
pub mod config;
pub mod details;
pub mod error;
pub mod histogram;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod savings;

pub use aggregator::{AggregatedWindow, RecommendationAggregator};
pub use builder::PartialHistogramBuilder;
pub use config::RecommenderConfig;
pub use error::{RecommendationError, Result};
pub use histogram::{DecayPolicy, DecayingHistogram, HistogramCheckpoint, HistogramOptions, NoDecay};
pub use models::*;
pub use observability::{JobLogger, JobMetrics};
pub use pipeline::{Collaborators, RecommendationPipeline, RunReport, WorkloadOutcome};
pub use savings::SavingsEstimator;
