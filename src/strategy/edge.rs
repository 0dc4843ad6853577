//! Edge aggregation.
//!
//! Merges one market's signals into at most one `Opportunity`: applies the
//! market-selection gate, combines measured gaps and conviction nudges into
//! a signed edge, and keeps the result only when both the edge and the
//! expected value clear their thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::detectors::signal::{canonicalize, Signal, SignalPayload, WalletPattern};
use crate::types::{reaches, within, EngineError, MarketCategory, MarketSnapshot, Side};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Markets with less liquidity are skipped (USD).
    pub min_liquidity: f64,
    /// Markets resolving sooner are skipped unless overridden.
    pub min_days_to_resolution: f64,
    /// Market ids exempt from the resolution-horizon check.
    pub horizon_overrides: Vec<String>,
    /// Markets within this distance of 50% need a thesis signal.
    pub coin_flip_band: f64,
    /// Weight on the mean of measured probability gaps.
    pub measured_weight: f64,
    pub smart_wallet_nudge: f64,
    pub fresh_wallet_nudge: f64,
    pub outsized_trade_nudge: f64,
    pub volume_nudge: f64,
    /// Minimum |edge| to emit an opportunity.
    pub min_edge: f64,
    /// Minimum expected value per USD 1 staked.
    pub min_expected_value: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_liquidity: 5_000.0,
            min_days_to_resolution: 30.0,
            horizon_overrides: Vec::new(),
            coin_flip_band: 0.05,
            measured_weight: 1.0,
            smart_wallet_nudge: 0.02,
            fresh_wallet_nudge: 0.03,
            outsized_trade_nudge: 0.01,
            volume_nudge: 0.01,
            min_edge: 0.03,
            min_expected_value: 0.05,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let unit = |field: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(EngineError::config(field, "must be in [0, 1]"))
            }
        };
        if !(self.min_liquidity.is_finite() && self.min_liquidity >= 0.0) {
            return Err(EngineError::config("aggregation.min_liquidity", "must be non-negative"));
        }
        if !self.min_days_to_resolution.is_finite() {
            return Err(EngineError::config("aggregation.min_days_to_resolution", "must be finite"));
        }
        if !(0.0..0.5).contains(&self.coin_flip_band) {
            return Err(EngineError::config("aggregation.coin_flip_band", "must be in [0, 0.5)"));
        }
        unit("aggregation.measured_weight", self.measured_weight)?;
        unit("aggregation.smart_wallet_nudge", self.smart_wallet_nudge)?;
        unit("aggregation.fresh_wallet_nudge", self.fresh_wallet_nudge)?;
        unit("aggregation.outsized_trade_nudge", self.outsized_trade_nudge)?;
        unit("aggregation.volume_nudge", self.volume_nudge)?;
        unit("aggregation.min_edge", self.min_edge)?;
        if !(self.min_expected_value.is_finite() && self.min_expected_value >= 0.0) {
            return Err(EngineError::config(
                "aggregation.min_expected_value",
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A scored, directional mispricing candidate for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Stable id derived from market id and observation time.
    pub id: Uuid,
    pub market_id: String,
    pub question: String,
    pub category: MarketCategory,
    /// Market YES probability at observation.
    pub market_probability: f64,
    /// Implied fair YES probability (`market_probability + edge`).
    pub fair_probability: f64,
    /// Signed edge in YES terms, in [-1, 1].
    pub edge: f64,
    pub side: Side,
    /// Expected profit per USD 1 staked on `side`.
    pub expected_value: f64,
    pub liquidity: f64,
    pub days_to_resolution: f64,
    pub observed_at: DateTime<Utc>,
    /// Contributing signals in canonical order.
    pub signals: Vec<Signal>,
}

impl Opportunity {
    pub fn abs_edge(&self) -> f64 {
        self.edge.abs()
    }

    /// Price of one share on the implied side.
    pub fn side_price(&self) -> f64 {
        match self.side {
            Side::Yes => self.market_probability,
            Side::No => 1.0 - self.market_probability,
        }
    }

    /// Fair probability that the implied side wins.
    pub fn side_fair_probability(&self) -> f64 {
        match self.side {
            Side::Yes => self.fair_probability,
            Side::No => 1.0 - self.fair_probability,
        }
    }

    /// Signal rationales joined for alert text.
    pub fn rationale(&self) -> String {
        self.signals
            .iter()
            .map(|s| s.rationale.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {:.1}% (fair {:.1}%, edge {:+.1} pts, EV {:.1}%)",
            self.side,
            self.market_id,
            self.market_probability * 100.0,
            self.fair_probability * 100.0,
            self.edge * 100.0,
            self.expected_value * 100.0,
        )
    }
}

/// Deterministic opportunity id.
pub fn opportunity_id(market_id: &str, observed_at: DateTime<Utc>) -> Uuid {
    let name = format!("{}@{}", market_id, observed_at.to_rfc3339());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why the selection gate dropped a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterReason {
    DegeneratePrice { probability: f64 },
    Illiquid { liquidity: f64, min: f64 },
    ResolvesTooSoon { days: f64, min: f64 },
    CoinFlip { probability: f64 },
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::DegeneratePrice { probability } => {
                write!(f, "degenerate price {:.3}", probability)
            }
            FilterReason::Illiquid { liquidity, min } => {
                write!(f, "liquidity ${:.0} below ${:.0}", liquidity, min)
            }
            FilterReason::ResolvesTooSoon { days, min } => {
                write!(f, "resolves in {:.1}d, minimum {:.0}d", days, min)
            }
            FilterReason::CoinFlip { probability } => {
                write!(f, "coin flip at {:.1}% without a thesis", probability * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    NoSignals,
    Filtered(FilterReason),
    BelowThreshold { edge: f64, expected_value: f64 },
    Candidate(Opportunity),
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct EdgeAggregator {
    config: AggregatorConfig,
}

impl EdgeAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Turn one market's signals into an outcome.
    pub fn aggregate(
        &self,
        snapshot: &MarketSnapshot,
        mut signals: Vec<Signal>,
    ) -> AggregateOutcome {
        if signals.is_empty() {
            return AggregateOutcome::NoSignals;
        }

        let has_thesis = signals.iter().any(Signal::is_thesis);
        if let Some(reason) = self.gate(snapshot, has_thesis) {
            debug!(market_id = %snapshot.id, reason = %reason, "Market filtered");
            return AggregateOutcome::Filtered(reason);
        }

        canonicalize(&mut signals);
        let edge = self.combine(snapshot.probability, &signals);
        let side = if edge > 0.0 { Side::Yes } else { Side::No };
        let expected_value = expected_value(snapshot.price_of(side), edge);

        let clears = reaches(edge.abs(), self.config.min_edge)
            && reaches(expected_value, self.config.min_expected_value);
        if !clears {
            debug!(
                market_id = %snapshot.id,
                edge = %format!("{:+.1} pts", edge * 100.0),
                ev = %format!("{:.1}%", expected_value * 100.0),
                "Edge below threshold"
            );
            return AggregateOutcome::BelowThreshold { edge, expected_value };
        }

        AggregateOutcome::Candidate(Opportunity {
            id: opportunity_id(&snapshot.id, snapshot.observed_at),
            market_id: snapshot.id.clone(),
            question: snapshot.question.clone(),
            category: snapshot.category,
            market_probability: snapshot.probability,
            fair_probability: (snapshot.probability + edge).clamp(0.0, 1.0),
            edge,
            side,
            expected_value,
            liquidity: snapshot.liquidity,
            days_to_resolution: snapshot.days_to_resolution,
            observed_at: snapshot.observed_at,
            signals,
        })
    }

    /// Market-selection gate. `None` means the market may be evaluated.
    pub fn gate(&self, snapshot: &MarketSnapshot, has_thesis: bool) -> Option<FilterReason> {
        let cfg = &self.config;
        let p = snapshot.probability;

        if !(p > 0.0 && p < 1.0) {
            return Some(FilterReason::DegeneratePrice { probability: p });
        }
        if snapshot.liquidity < cfg.min_liquidity {
            return Some(FilterReason::Illiquid {
                liquidity: snapshot.liquidity,
                min: cfg.min_liquidity,
            });
        }
        if snapshot.days_to_resolution < cfg.min_days_to_resolution
            && !cfg.horizon_overrides.iter().any(|id| *id == snapshot.id)
        {
            return Some(FilterReason::ResolvesTooSoon {
                days: snapshot.days_to_resolution,
                min: cfg.min_days_to_resolution,
            });
        }
        if within((p - 0.5).abs(), cfg.coin_flip_band) && !has_thesis {
            return Some(FilterReason::CoinFlip { probability: p });
        }
        None
    }

    /// Combine canonically ordered signals into a signed YES edge, clamped
    /// so that `probability + edge` stays inside [0, 1].
    pub fn combine(&self, probability: f64, signals: &[Signal]) -> f64 {
        let cfg = &self.config;
        let mut measured_sum = 0.0;
        let mut measured_n = 0usize;
        let mut nudge = 0.0;

        for signal in signals {
            match &signal.payload {
                SignalPayload::ProbabilityDivergence(d) => {
                    measured_sum += d.gap();
                    measured_n += 1;
                }
                SignalPayload::CorrelationDivergence(c) => {
                    if let Some(gap) = c.gap() {
                        measured_sum += gap;
                        measured_n += 1;
                    }
                }
                SignalPayload::Wallet(w) => {
                    let size = match w.pattern {
                        WalletPattern::Smart => cfg.smart_wallet_nudge,
                        WalletPattern::Fresh => cfg.fresh_wallet_nudge,
                        WalletPattern::Outsized => cfg.outsized_trade_nudge,
                    };
                    nudge += w.side.sign() * size;
                }
                SignalPayload::VolumeSpike(v) => {
                    if v.window_move > 0.0 {
                        nudge += cfg.volume_nudge;
                    } else if v.window_move < 0.0 {
                        nudge -= cfg.volume_nudge;
                    }
                }
                // Mentions carry no direction.
                SignalPayload::SocialSpike(_) => {}
            }
        }

        let measured = if measured_n > 0 {
            cfg.measured_weight * measured_sum / measured_n as f64
        } else {
            0.0
        };

        let raw = measured + nudge;
        if !raw.is_finite() {
            return 0.0;
        }
        raw.clamp(-probability, 1.0 - probability)
    }
}

/// Expected profit per USD 1 staked at `price` with the given edge.
pub fn expected_value(price: f64, edge: f64) -> f64 {
    if price <= 0.0 || !price.is_finite() {
        return 0.0;
    }
    edge.abs() / price
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
