//! Strategy engine: edge aggregation, Kelly sizing and risk management,
//! orchestrated per polling cycle by the `DecisionPipeline`.

pub mod edge;
pub mod kelly;
pub mod risk;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::detectors::{DetectorConfig, DetectorSet, MarketContext};
use crate::engine::correlation::CorrelationAnalyzer;
use crate::types::{
    CorrelatedPair, CycleInput, EngineError, MarketFeed, MarketSnapshot, PortfolioState,
};
use edge::{AggregateOutcome, AggregatorConfig, EdgeAggregator, FilterReason};
use kelly::{PositionSizer, SizingConfig};
use risk::{FinalDecision, PositionAlert, RiskConfig, RiskManager};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Every threshold the engine uses. Immutable for the life of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads used to evaluate markets (1 = sequential).
    pub workers: usize,
    pub detectors: DetectorConfig,
    pub aggregation: AggregatorConfig,
    pub sizing: SizingConfig,
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            detectors: DetectorConfig::default(),
            aggregation: AggregatorConfig::default(),
            sizing: SizingConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::config("engine.workers", "must be at least 1"));
        }
        self.detectors.validate()?;
        self.aggregation.validate()?;
        self.sizing.validate()?;
        self.risk.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one market during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvaluation {
    NoSignals,
    Filtered(FilterReason),
    BelowThreshold { edge: f64, expected_value: f64 },
    Decided(FinalDecision),
}

/// Per-cycle counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub markets: usize,
    pub signals: usize,
    pub no_signals: usize,
    pub filtered: usize,
    pub below_threshold: usize,
    pub invalid: usize,
    pub accepted: usize,
    pub modified: usize,
    pub rejected: usize,
    /// Sum of actionable stakes.
    pub proposed_stake: Decimal,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// One decision per market that produced a candidate, in input order.
    pub decisions: Vec<FinalDecision>,
    pub alerts: Vec<PositionAlert>,
    pub stats: CycleStats,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs detectors → aggregator → sizer → risk manager over every market.
///
/// Every market is sized and gated against the same read-only portfolio,
/// so decisions within one cycle never depend on each other and the
/// output does not change with the worker count.
pub struct DecisionPipeline {
    detectors: DetectorSet,
    aggregator: EdgeAggregator,
    sizer: PositionSizer,
    risk: RiskManager,
    correlation: CorrelationAnalyzer,
    workers: usize,
}

impl DecisionPipeline {
    /// Validate the configuration and build every component.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            detectors: DetectorSet::from_config(&config.detectors),
            aggregator: EdgeAggregator::new(config.aggregation.clone()),
            sizer: PositionSizer::new(config.sizing.clone(), config.risk.max_exposure_pct),
            risk: RiskManager::new(config.risk.clone()),
            correlation: CorrelationAnalyzer::new(&config.detectors.correlation),
            workers: config.workers,
        })
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn detectors(&self) -> &DetectorSet {
        &self.detectors
    }

    /// Evaluate every market in the cycle.
    pub fn run_cycle(&self, input: &CycleInput, portfolio: &PortfolioState) -> CycleOutcome {
        let first_index = first_occurrences(&input.markets);

        let peers: HashMap<&str, &MarketSnapshot> = input
            .markets
            .iter()
            .enumerate()
            .filter(|(i, f)| first_index.get(f.snapshot.id.as_str()) == Some(i))
            .filter(|(_, f)| f.snapshot.validate().is_ok())
            .map(|(_, f)| (f.snapshot.id.as_str(), &f.snapshot))
            .collect();

        let computed;
        let pairs: &[CorrelatedPair] = match &input.correlations {
            Some(pairs) => pairs,
            None => {
                let mut snapshots: Vec<&MarketSnapshot> = peers.values().copied().collect();
                snapshots.sort_by(|a, b| a.id.cmp(&b.id));
                computed = self.correlation.find_pairs(&snapshots);
                &computed
            }
        };

        let evaluate = |index: usize, feed: &MarketFeed| {
            if first_index.get(feed.snapshot.id.as_str()) != Some(&index) {
                return Err(EngineError::InvalidSnapshot {
                    market_id: feed.snapshot.id.clone(),
                    reason: "duplicate market id".into(),
                });
            }
            self.evaluate_market(feed, pairs, &peers, portfolio)
        };

        let results: Vec<Result<MarketEvaluation, EngineError>> =
            if self.workers <= 1 || input.markets.len() < 2 {
                input.markets.iter().enumerate().map(|(i, f)| evaluate(i, f)).collect()
            } else {
                let chunk = input.markets.len().div_ceil(self.workers);
                let evaluate = &evaluate;
                std::thread::scope(|scope| {
                    let handles: Vec<_> = input
                        .markets
                        .chunks(chunk)
                        .enumerate()
                        .map(|(c, feeds)| {
                            scope.spawn(move || {
                                feeds
                                    .iter()
                                    .enumerate()
                                    .map(|(j, f)| evaluate(c * chunk + j, f))
                                    .collect::<Vec<_>>()
                            })
                        })
                        .collect();
                    handles
                        .into_iter()
                        .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                        .collect()
                })
            };

        let mut stats = CycleStats {
            markets: input.markets.len(),
            ..Default::default()
        };
        let mut decisions = Vec::new();

        for result in results {
            match result {
                Ok(MarketEvaluation::NoSignals) => stats.no_signals += 1,
                Ok(MarketEvaluation::Filtered(_)) => stats.filtered += 1,
                Ok(MarketEvaluation::BelowThreshold { .. }) => stats.below_threshold += 1,
                Ok(MarketEvaluation::Decided(decision)) => {
                    stats.signals += decision.recommendation().opportunity.signals.len();
                    match &decision {
                        FinalDecision::Accepted(_) => stats.accepted += 1,
                        FinalDecision::Modified { .. } => stats.modified += 1,
                        FinalDecision::Rejected { .. } => stats.rejected += 1,
                    }
                    stats.proposed_stake += decision.final_stake();
                    decisions.push(decision);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping market");
                    stats.invalid += 1;
                }
            }
        }

        let alerts = self.risk.review_positions(portfolio, &peers);

        info!(
            markets = stats.markets,
            decisions = decisions.len(),
            accepted = stats.accepted,
            modified = stats.modified,
            rejected = stats.rejected,
            alerts = alerts.len(),
            "Cycle evaluated"
        );

        CycleOutcome {
            decisions,
            alerts,
            stats,
        }
    }

    /// Evaluate one market against the shared cycle context.
    pub fn evaluate_market(
        &self,
        feed: &MarketFeed,
        pairs: &[CorrelatedPair],
        peers: &HashMap<&str, &MarketSnapshot>,
        portfolio: &PortfolioState,
    ) -> Result<MarketEvaluation, EngineError> {
        feed.snapshot.validate()?;

        let ctx = MarketContext::from_feed(feed, pairs, peers);
        let signals = self.detectors.detect(&ctx);
        debug!(market_id = %feed.snapshot.id, signals = signals.len(), "Detectors ran");

        let opportunity = match self.aggregator.aggregate(&feed.snapshot, signals) {
            AggregateOutcome::NoSignals => return Ok(MarketEvaluation::NoSignals),
            AggregateOutcome::Filtered(reason) => return Ok(MarketEvaluation::Filtered(reason)),
            AggregateOutcome::BelowThreshold { edge, expected_value } => {
                return Ok(MarketEvaluation::BelowThreshold { edge, expected_value })
            }
            AggregateOutcome::Candidate(opportunity) => opportunity,
        };

        let recommendation = self.sizer.size(&opportunity, portfolio, pairs);
        let decision = self.risk.evaluate(recommendation, portfolio);

        match &decision {
            FinalDecision::Rejected { reason, .. } => warn!(
                market_id = %feed.snapshot.id,
                reason = %reason,
                "Opportunity rejected"
            ),
            _ => info!(
                market_id = %feed.snapshot.id,
                side = %decision.recommendation().opportunity.side,
                edge = format!("{:+.1} pts", decision.recommendation().opportunity.edge * 100.0),
                stake = format!("${:.2}", decision.final_stake()),
                "{}",
                decision.label()
            ),
        }

        Ok(MarketEvaluation::Decided(decision))
    }
}

/// Index of the first feed for each market id.
fn first_occurrences(markets: &[MarketFeed]) -> HashMap<&str, usize> {
    let mut first = HashMap::new();
    for (i, feed) in markets.iter().enumerate() {
        first.entry(feed.snapshot.id.as_str()).or_insert(i);
    }
    first
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
