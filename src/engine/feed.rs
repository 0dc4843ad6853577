//! Cycle input sources.
//!
//! The data layer (market APIs, blockchain monitor, social monitor) runs
//! outside this crate and hands each cycle over as JSON. `CycleFeed`
//! abstracts where that JSON comes from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::types::{CycleInput, PortfolioState};

/// Source of per-cycle input and the current portfolio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CycleFeed: Send + Sync {
    /// Markets, references, wallet activity and mentions for this cycle.
    async fn load_cycle(&self) -> Result<CycleInput>;

    /// Bankroll and open positions as the operator last recorded them.
    async fn load_portfolio(&self) -> Result<PortfolioState>;
}

/// Reads both inputs from JSON files, re-reading them every cycle.
pub struct JsonFileFeed {
    input_path: PathBuf,
    portfolio_path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(input_path: impl Into<PathBuf>, portfolio_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            portfolio_path: portfolio_path.into(),
        }
    }
}

#[async_trait]
impl CycleFeed for JsonFileFeed {
    async fn load_cycle(&self) -> Result<CycleInput> {
        let json = tokio::fs::read_to_string(&self.input_path)
            .await
            .with_context(|| format!("Failed to read cycle input {}", self.input_path.display()))?;
        let input: CycleInput = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse cycle input {}", self.input_path.display()))?;
        debug!(
            path = %self.input_path.display(),
            markets = input.markets.len(),
            "Cycle input loaded"
        );
        Ok(input)
    }

    async fn load_portfolio(&self) -> Result<PortfolioState> {
        let json = tokio::fs::read_to_string(&self.portfolio_path)
            .await
            .with_context(|| {
                format!("Failed to read portfolio {}", self.portfolio_path.display())
            })?;
        let portfolio: PortfolioState = serde_json::from_str(&json)
            .with_context(|| {
                format!("Failed to parse portfolio {}", self.portfolio_path.display())
            })?;
        Ok(portfolio)
    }
}
