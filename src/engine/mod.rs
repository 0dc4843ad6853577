//! Cycle driver: load the feed, run the pipeline, report.
//!
//! Everything with I/O lives here; the pipeline it calls is pure.

pub mod correlation;
pub mod feed;
pub mod report;

use anyhow::{Context, Result};
use tracing::info;

use crate::strategy::{CycleOutcome, DecisionPipeline};
use feed::CycleFeed;
use report::CycleReport;

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleRun {
    pub outcome: CycleOutcome,
    pub report: CycleReport,
}

/// Load one cycle from `feed` and evaluate it.
pub async fn run_cycle(
    feed: &dyn CycleFeed,
    pipeline: &DecisionPipeline,
    cycle_number: u64,
) -> Result<CycleRun> {
    info!(cycle = cycle_number, "Starting cycle");

    let input = feed.load_cycle().await.context("Loading cycle input")?;
    let portfolio = feed.load_portfolio().await.context("Loading portfolio")?;

    let outcome = pipeline.run_cycle(&input, &portfolio);
    let risk = pipeline.risk().config();
    let report = report::summarize(cycle_number, &input, &outcome, &portfolio, risk);

    for decision in &outcome.decisions {
        info!("{}", decision);
    }
    for alert in &outcome.alerts {
        info!("{}", alert);
    }

    Ok(CycleRun { outcome, report })
}
