//! Cycle reporting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::strategy::risk::{PortfolioSummary, RiskConfig};
use crate::strategy::{CycleOutcome, CycleStats};
use crate::types::CycleInput;

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// Latest snapshot timestamp in the cycle, if any market was supplied.
    pub observed_at: Option<DateTime<Utc>>,
    pub stats: CycleStats,
    pub alerts: usize,
    pub portfolio: PortfolioSummary,
}

impl CycleReport {
    pub fn new(
        cycle_number: u64,
        input: &CycleInput,
        outcome: &CycleOutcome,
        portfolio: PortfolioSummary,
    ) -> Self {
        Self {
            cycle_number,
            observed_at: input.markets.iter().map(|m| m.snapshot.observed_at).max(),
            stats: outcome.stats.clone(),
            alerts: outcome.alerts.len(),
            portfolio,
        }
    }

    /// Stake proposed this cycle plus existing exposure, against the cap.
    pub fn projected_exposure(&self) -> Decimal {
        self.portfolio.total_exposure + self.stats.proposed_stake
    }

    /// Log a human-readable cycle summary.
    pub fn log(&self) {
        info!(
            cycle = self.cycle_number,
            markets = self.stats.markets,
            signals = self.stats.signals,
            filtered = self.stats.filtered,
            below_threshold = self.stats.below_threshold,
            accepted = self.stats.accepted,
            modified = self.stats.modified,
            rejected = self.stats.rejected,
            alerts = self.alerts,
            proposed = format!("${:.2}", self.stats.proposed_stake),
            exposure = format!("${:.2}", self.portfolio.total_exposure),
            projected = format!("${:.2}", self.projected_exposure()),
            available = format!("${:.2}", self.portfolio.available_capital),
            "Cycle complete"
        );
        if self.stats.invalid > 0 {
            warn!(
                cycle = self.cycle_number,
                invalid = self.stats.invalid,
                "Markets skipped as invalid"
            );
        }
    }
}

/// Convenience: summarise the portfolio the cycle ran against.
pub fn summarize(
    cycle_number: u64,
    input: &CycleInput,
    outcome: &CycleOutcome,
    portfolio: &crate::types::PortfolioState,
    risk: &RiskConfig,
) -> CycleReport {
    CycleReport::new(cycle_number, input, outcome, PortfolioSummary::new(portfolio, risk))
}
