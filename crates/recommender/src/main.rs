//! Recommender - daily workload rightsizing job
//!
//! Reads one account's utilization, allocation and cost snapshot for a day,
//! runs the recommendation pipeline over it, and prints the recommendations
//! together with the per-workload outcomes. Job metrics can be written to a
//! textfile for a node exporter to pick up after the run.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use recommender_lib::{JobMetrics, Recommendation, RecommendationPipeline, RunReport};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod snapshot;

const RECOMMENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Daily workload rightsizing job
#[derive(Parser, Debug)]
#[command(name = "recommender")]
#[command(
    author,
    version,
    about = "Computes rightsizing recommendations for one day",
    long_about = None
)]
pub struct Cli {
    /// JSON snapshot of workloads, samples, costs and stored history
    #[arg(long, short)]
    pub input: PathBuf,

    /// Account the snapshot belongs to
    #[arg(long, env = "RECOMMENDER_ACCOUNT")]
    pub account: String,

    /// Day to process (defaults to yesterday, UTC)
    #[arg(long)]
    pub day: Option<NaiveDate>,

    /// Optional configuration file (TOML, YAML or JSON)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Write job metrics in the Prometheus text format to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

/// What the job prints on stdout
#[derive(Debug, Serialize)]
struct JobOutput {
    report: RunReport,
    recommendations: Vec<Recommendation>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(version = RECOMMENDER_VERSION, "Starting recommender");

    let output = run(&cli).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .context("Failed to serialize job output")?;
    println!("{}", rendered);

    Ok(())
}

async fn run(cli: &Cli) -> Result<JobOutput> {
    let config = config::load(cli.config.as_deref())?;
    info!(
        window_days = config.window_days,
        batch_size = config.batch_size,
        worker_pool_size = config.worker_pool_size,
        "Recommender configured"
    );

    let day = cli
        .day
        .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(1));

    let snapshot = snapshot::InputSnapshot::load(&cli.input)?;
    let workloads = snapshot.workload_refs();
    let loaded = snapshot.into_collaborators().await?;

    let pipeline = RecommendationPipeline::new(config, loaded.collaborators)
        .context("Invalid recommender configuration")?;
    let report = pipeline.run_day(&cli.account, day, &workloads).await;
    info!(
        partial_histograms = loaded.histograms.len(),
        recommendations = loaded.recommendations.len(),
        "Stores updated"
    );

    if let Some(path) = &cli.metrics_file {
        let text = JobMetrics::new().render_text()?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(JobOutput {
        report,
        recommendations: loaded.recommendations.recommendations(),
    })
}
