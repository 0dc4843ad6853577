//! Kelly criterion position sizing.
//!
//! Computes fractional-Kelly stakes for an opportunity, then applies the
//! per-position cap, the correlated-position reduction, the exposure
//! headroom clamp and the bankroll clamp, in that order. Every step can only
//! shrink the stake.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::edge::Opportunity;
use crate::types::{usd, CorrelatedPair, EngineError, OpenPosition, PortfolioState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fractional Kelly multiplier (0.5 = half-Kelly).
    pub kelly_multiplier: f64,
    /// Maximum stake as a fraction of bankroll.
    pub max_stake_pct: f64,
    /// Stakes below this many dollars become zero.
    pub min_stake: Decimal,
    /// |coefficient| at which a pair counts as correlated with a position.
    pub correlation_threshold: f64,
    /// Applied to the stake when a correlated position is already open.
    pub correlation_reduction_factor: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_multiplier: 0.5,
            max_stake_pct: 0.40,
            min_stake: dec!(1),
            correlation_threshold: 0.7,
            correlation_reduction_factor: 0.5,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0) {
            return Err(EngineError::config("sizing.kelly_multiplier", "must be in (0, 1]"));
        }
        if !(self.max_stake_pct > 0.0 && self.max_stake_pct <= 1.0) {
            return Err(EngineError::config("sizing.max_stake_pct", "must be in (0, 1]"));
        }
        if self.min_stake < Decimal::ZERO {
            return Err(EngineError::config("sizing.min_stake", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(EngineError::config("sizing.correlation_threshold", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.correlation_reduction_factor) {
            return Err(EngineError::config(
                "sizing.correlation_reduction_factor",
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// One sizing step that shaped the stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SizingNote {
    FractionalKelly { multiplier: f64 },
    StakeCapped { max_pct: f64 },
    CorrelationReduced { market_id: String, factor: f64 },
    ExposureClamped { headroom: Decimal },
    BankrollClamped { bankroll: Decimal },
    BelowMinimum { min: Decimal },
    NoEdge { kelly: f64 },
    Degenerate { reason: String },
}

impl fmt::Display for SizingNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingNote::FractionalKelly { multiplier } => write!(f, "{:.2}x Kelly", multiplier),
            SizingNote::StakeCapped { max_pct } => {
                write!(f, "capped at {:.0}% of bankroll", max_pct * 100.0)
            }
            SizingNote::CorrelationReduced { market_id, factor } => {
                write!(f, "x{:.2} for correlated position in {}", factor, market_id)
            }
            SizingNote::ExposureClamped { headroom } => {
                write!(f, "clamped to ${:.2} exposure headroom", headroom)
            }
            SizingNote::BankrollClamped { bankroll } => {
                write!(f, "clamped to ${:.2} bankroll", bankroll)
            }
            SizingNote::BelowMinimum { min } => write!(f, "below ${:.2} minimum", min),
            SizingNote::NoEdge { kelly } => write!(f, "Kelly {:.4} leaves no bet", kelly),
            SizingNote::Degenerate { reason } => write!(f, "degenerate: {}", reason),
        }
    }
}

/// A stake recommendation for one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedRecommendation {
    pub opportunity: Opportunity,
    /// Full Kelly fraction for the implied side (0.0 when degenerate).
    pub kelly_fraction: f64,
    /// Fraction of bankroll after the multiplier and per-position cap.
    pub applied_fraction: f64,
    /// Stake before correlation, headroom and bankroll clamps.
    pub raw_stake: Decimal,
    /// Recommended stake in USD, `0 <= stake <= bankroll`.
    pub stake: Decimal,
    pub notes: Vec<SizingNote>,
}

impl SizedRecommendation {
    /// Sizing steps as one human-readable string.
    pub fn sizing_rationale(&self) -> String {
        self.notes
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Copy with a reduced stake.
    pub fn with_stake(&self, stake: Decimal) -> Self {
        Self {
            stake,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

pub struct PositionSizer {
    config: SizingConfig,
    /// Portfolio exposure cap shared with the risk manager.
    max_exposure_pct: Decimal,
}

impl PositionSizer {
    pub fn new(config: SizingConfig, max_exposure_pct: Decimal) -> Self {
        Self {
            config,
            max_exposure_pct,
        }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Full Kelly fraction for buying a side priced at `price` that wins
    /// with probability `win_prob`.
    ///
    /// f* = (b·q − (1 − q)) / b with b = (1 − price) / price.
    pub fn kelly_fraction(price: f64, win_prob: f64) -> Option<f64> {
        if !(price > 0.0 && price < 1.0) || !win_prob.is_finite() {
            return None;
        }
        let b = (1.0 - price) / price;
        if b <= 0.0 || !b.is_finite() {
            return None;
        }
        let kelly = (b * win_prob - (1.0 - win_prob)) / b;
        kelly.is_finite().then_some(kelly)
    }

    /// The open position that makes this opportunity a correlated bet, if any.
    pub fn correlated_position<'p>(
        &self,
        opportunity: &Opportunity,
        portfolio: &'p PortfolioState,
        pairs: &[CorrelatedPair],
    ) -> Option<&'p OpenPosition> {
        let market = opportunity.market_id.as_str();
        portfolio.positions.iter().find(|pos| {
            pos.market_id == market
                || pos.correlated_market_id.as_deref() == Some(market)
                || pairs.iter().any(|pair| {
                    pair.coefficient.abs() >= self.config.correlation_threshold
                        && pair.other(market) == Some(pos.market_id.as_str())
                })
        })
    }

    /// Size a stake for an opportunity against the current portfolio.
    pub fn size(
        &self,
        opportunity: &Opportunity,
        portfolio: &PortfolioState,
        pairs: &[CorrelatedPair],
    ) -> SizedRecommendation {
        let cfg = &self.config;
        let mut notes = Vec::new();
        let zero = |kelly_fraction: f64, notes: Vec<SizingNote>| SizedRecommendation {
            opportunity: opportunity.clone(),
            kelly_fraction,
            applied_fraction: 0.0,
            raw_stake: Decimal::ZERO,
            stake: Decimal::ZERO,
            notes,
        };

        if portfolio.bankroll <= Decimal::ZERO {
            notes.push(SizingNote::Degenerate { reason: "empty bankroll".into() });
            return zero(0.0, notes);
        }
        let bankroll = portfolio.bankroll.to_f64().unwrap_or(0.0);

        let Some(kelly) =
            Self::kelly_fraction(opportunity.side_price(), opportunity.side_fair_probability())
        else {
            notes.push(SizingNote::Degenerate {
                reason: format!("no odds at price {:.4}", opportunity.side_price()),
            });
            return zero(0.0, notes);
        };

        if kelly <= 0.0 {
            debug!(market_id = %opportunity.market_id, kelly, "Negative Kelly, no bet");
            notes.push(SizingNote::NoEdge { kelly });
            return zero(kelly, notes);
        }

        let mut fraction = kelly * cfg.kelly_multiplier;
        notes.push(SizingNote::FractionalKelly { multiplier: cfg.kelly_multiplier });
        if fraction > cfg.max_stake_pct {
            fraction = cfg.max_stake_pct;
            notes.push(SizingNote::StakeCapped { max_pct: cfg.max_stake_pct });
        }

        let raw_stake = usd(fraction * bankroll);
        let mut stake = raw_stake;

        // (a) correlated with something already held
        if let Some(pos) = self.correlated_position(opportunity, portfolio, pairs) {
            let factor =
                Decimal::from_f64(cfg.correlation_reduction_factor).unwrap_or(Decimal::ZERO);
            stake = (stake * factor).round_dp_with_strategy(2, RoundingStrategy::ToZero);
            notes.push(SizingNote::CorrelationReduced {
                market_id: pos.market_id.clone(),
                factor: cfg.correlation_reduction_factor,
            });
        }

        // (b) exposure headroom
        let headroom = portfolio
            .headroom(self.max_exposure_pct)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if stake > headroom {
            stake = headroom;
            notes.push(SizingNote::ExposureClamped { headroom });
        }

        if stake > portfolio.bankroll {
            stake = portfolio.bankroll;
            notes.push(SizingNote::BankrollClamped { bankroll: portfolio.bankroll });
        }

        if stake < cfg.min_stake {
            stake = Decimal::ZERO;
            notes.push(SizingNote::BelowMinimum { min: cfg.min_stake });
        }

        debug!(
            market_id = %opportunity.market_id,
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            fraction = format!("{:.2}%", fraction * 100.0),
            stake = format!("${:.2}", stake),
            "Stake sized"
        );

        SizedRecommendation {
            opportunity: opportunity.clone(),
            kelly_fraction: kelly,
            applied_fraction: fraction,
            raw_stake,
            stake: stake.max(Decimal::ZERO),
            notes,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
