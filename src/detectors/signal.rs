//! Signal records emitted by the detectors.
//!
//! A `Signal` is an immutable value: a detector creates it, the edge
//! aggregator consumes it, and it is only ever persisted as part of the
//! `Opportunity` that references it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::Side;

/// The five signal families. Declaration order is the canonical order of
/// signals inside an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalKind {
    VolumeSpike,
    ProbabilityDivergence,
    Wallet,
    SocialSpike,
    CorrelationDivergence,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::VolumeSpike => write!(f, "Volume Spike"),
            SignalKind::ProbabilityDivergence => write!(f, "Probability Divergence"),
            SignalKind::Wallet => write!(f, "Wallet Activity"),
            SignalKind::SocialSpike => write!(f, "Social Spike"),
            SignalKind::CorrelationDivergence => write!(f, "Correlation Divergence"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpike {
    pub window_volume: f64,
    /// Baseline volume scaled to the window length.
    pub baseline_volume: f64,
    pub ratio: f64,
    /// Multiplier actually applied (lowered for niche markets).
    pub effective_multiplier: f64,
    pub niche: bool,
    /// YES probability change across the spike window (0.0 if unknown).
    pub window_move: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityDivergence {
    pub source: String,
    pub market_probability: f64,
    pub reference_probability: f64,
}

impl ProbabilityDivergence {
    /// Measured mispricing in YES terms: positive when the market
    /// underprices YES relative to the reference.
    pub fn gap(&self) -> f64 {
        self.reference_probability - self.market_probability
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WalletPattern {
    /// Long, profitable history placing a sizeable trade.
    Smart,
    /// New, single-market wallet placing a large bet.
    Fresh,
    /// A trade far larger than the market's typical trade this cycle.
    Outsized,
}

impl fmt::Display for WalletPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletPattern::Smart => write!(f, "smart wallet"),
            WalletPattern::Fresh => write!(f, "fresh wallet"),
            WalletPattern::Outsized => write!(f, "outsized trade"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSignal {
    pub pattern: WalletPattern,
    pub wallet: String,
    pub side: Side,
    pub size_usd: f64,
    pub wallet_age_hours: Option<f64>,
    pub trade_count: Option<u32>,
    pub success_rate: Option<f64>,
    pub market_concentration: Option<f64>,
    /// Median trade size on the market, for outsized trades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_size_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSpike {
    pub keywords: Vec<String>,
    pub mentions: u32,
    /// Mentions normalised to the configured window.
    pub normalised_mentions: f64,
    pub threshold: u32,
}

/// Which side of a correlated pair moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationRole {
    /// This market moved; its pair did not.
    Leader,
    /// Its pair moved; this market has not caught up.
    Laggard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationDivergence {
    pub pair_market_id: String,
    pub coefficient: f64,
    pub own_move: f64,
    pub pair_move: f64,
    pub role: CorrelationRole,
}

impl CorrelationDivergence {
    /// Expected catch-up for a laggard, in YES terms. Leaders carry no
    /// measured gap.
    pub fn gap(&self) -> Option<f64> {
        match self.role {
            CorrelationRole::Laggard => Some(self.coefficient * self.pair_move - self.own_move),
            CorrelationRole::Leader => None,
        }
    }
}

/// Kind-specific signal data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalPayload {
    VolumeSpike(VolumeSpike),
    ProbabilityDivergence(ProbabilityDivergence),
    Wallet(WalletSignal),
    SocialSpike(SocialSpike),
    CorrelationDivergence(CorrelationDivergence),
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// One detector finding for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub market_id: String,
    /// Always finite and non-negative.
    pub strength: f64,
    pub rationale: String,
    pub payload: SignalPayload,
}

impl Signal {
    pub fn new(
        market_id: impl Into<String>,
        strength: f64,
        rationale: impl Into<String>,
        payload: SignalPayload,
    ) -> Self {
        let strength = if strength.is_finite() { strength.max(0.0) } else { 0.0 };
        Self {
            market_id: market_id.into(),
            strength,
            rationale: rationale.into(),
            payload,
        }
    }

    pub fn kind(&self) -> SignalKind {
        match &self.payload {
            SignalPayload::VolumeSpike(_) => SignalKind::VolumeSpike,
            SignalPayload::ProbabilityDivergence(_) => SignalKind::ProbabilityDivergence,
            SignalPayload::Wallet(_) => SignalKind::Wallet,
            SignalPayload::SocialSpike(_) => SignalKind::SocialSpike,
            SignalPayload::CorrelationDivergence(_) => SignalKind::CorrelationDivergence,
        }
    }

    /// Whether the signal carries an explicit directional thesis, which
    /// lets a market near 50% through the coin-flip gate.
    pub fn is_thesis(&self) -> bool {
        match &self.payload {
            SignalPayload::ProbabilityDivergence(_) => true,
            SignalPayload::Wallet(w) => w.pattern == WalletPattern::Fresh,
            SignalPayload::CorrelationDivergence(c) => c.role == CorrelationRole::Laggard,
            SignalPayload::VolumeSpike(_) | SignalPayload::SocialSpike(_) => false,
        }
    }

    /// Secondary ordering key within a kind.
    fn sort_key(&self) -> String {
        match &self.payload {
            SignalPayload::ProbabilityDivergence(d) => d.source.clone(),
            SignalPayload::Wallet(w) => format!("{:?}:{}", w.pattern, w.wallet),
            SignalPayload::CorrelationDivergence(c) => c.pair_market_id.clone(),
            SignalPayload::VolumeSpike(_) | SignalPayload::SocialSpike(_) => String::new(),
        }
    }

    /// Total order used to canonicalise a market's signals.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.kind()
            .cmp(&other.kind())
            .then_with(|| self.sort_key().cmp(&other.sort_key()))
            .then_with(|| self.strength.total_cmp(&other.strength))
            .then_with(|| self.rationale.cmp(&other.rationale))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind(), self.rationale)
    }
}

/// Sort signals into canonical order in place.
pub fn canonicalize(signals: &mut [Signal]) {
    signals.sort_by(|a, b| a.canonical_cmp(b));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
