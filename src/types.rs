//! Shared types for the EDGEWATCH engine.
//!
//! These types form the data model passed between the detectors, the
//! aggregator, the sizer and the risk manager. Everything here is produced
//! by the external data layer before a cycle starts and is treated as
//! read-only for the whole cycle.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Traded volume inside one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBucket {
    /// Bucket start time. A bucket belongs to a window when its start does.
    pub start: DateTime<Utc>,
    /// Volume traded in the bucket, in USD.
    pub volume: f64,
}

/// A historical probability sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityPoint {
    pub at: DateTime<Utc>,
    pub probability: f64,
}

/// Point-in-time view of one market, valid for a single cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_category")]
    pub category: MarketCategory,
    /// Current YES probability (0.0–1.0).
    pub probability: f64,
    /// Available liquidity in USD.
    pub liquidity: f64,
    /// Rolling volume series, any order.
    #[serde(default)]
    pub volume_history: Vec<VolumeBucket>,
    /// Historical YES probability samples, any order.
    #[serde(default)]
    pub probability_history: Vec<ProbabilityPoint>,
    pub days_to_resolution: f64,
    /// When the snapshot was taken. The engine never reads the wall clock.
    pub observed_at: DateTime<Utc>,
}

fn default_category() -> MarketCategory {
    MarketCategory::Other
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (YES: {:.0}¢ | liq: ${:.0} | {:.0}d | {})",
            self.id,
            self.question,
            self.probability * 100.0,
            self.liquidity,
            self.days_to_resolution,
            self.category,
        )
    }
}

impl MarketSnapshot {
    /// Reject snapshots the engine cannot reason about.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidSnapshot {
            market_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("empty market id".into()));
        }
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(invalid(format!("probability {} outside [0, 1]", self.probability)));
        }
        if !self.liquidity.is_finite() || self.liquidity < 0.0 {
            return Err(invalid(format!(
                "liquidity {} is not a non-negative amount",
                self.liquidity
            )));
        }
        if !self.days_to_resolution.is_finite() {
            return Err(invalid("days_to_resolution is not finite".into()));
        }
        let bad_bucket = self
            .volume_history
            .iter()
            .find(|b| !b.volume.is_finite() || b.volume < 0.0);
        if let Some(b) = bad_bucket {
            return Err(invalid(format!("volume bucket at {} has volume {}", b.start, b.volume)));
        }
        Ok(())
    }

    /// Price of one share on the given side.
    pub fn price_of(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.probability,
            Side::No => 1.0 - self.probability,
        }
    }

    /// Total volume and bucket count for buckets starting in `[from, to)`.
    pub fn volume_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> (f64, usize) {
        self.volume_history
            .iter()
            .filter(|b| b.start >= from && b.start < to)
            .fold((0.0, 0), |(sum, n), b| (sum + b.volume, n + 1))
    }

    /// Latest historical probability sampled at or before `at`.
    pub fn probability_at_or_before(&self, at: DateTime<Utc>) -> Option<f64> {
        self.probability_history
            .iter()
            .filter(|p| p.at <= at)
            .max_by_key(|p| p.at)
            .map(|p| p.probability)
    }

    /// Latest historical probability sampled strictly before this snapshot.
    pub fn previous_probability(&self) -> Option<f64> {
        self.probability_history
            .iter()
            .filter(|p| p.at < self.observed_at)
            .max_by_key(|p| p.at)
            .map(|p| p.probability)
    }

    /// Signed move of the current probability since the previous sample.
    pub fn probability_move(&self) -> Option<f64> {
        self.previous_probability().map(|prev| self.probability - prev)
    }
}

/// Independent probability for the same event from another venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Venue name, e.g. "manifold" or "metaculus".
    pub source: String,
    pub probability: f64,
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wallet and social activity
// ---------------------------------------------------------------------------

/// One observed trade together with what is known about its wallet.
/// Unknown wallet facts are `None`; detectors never guess them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    pub wallet: String,
    pub market_id: String,
    pub side: Side,
    /// Notional size of this trade in USD.
    pub size_usd: f64,
    #[serde(default)]
    pub wallet_age_hours: Option<f64>,
    /// Lifetime number of trades across all markets.
    #[serde(default)]
    pub trade_count: Option<u32>,
    /// Fraction of resolved trades that won (0.0–1.0).
    #[serde(default)]
    pub success_rate: Option<f64>,
    /// Fraction of the wallet's total activity on this market (0.0–1.0).
    #[serde(default)]
    pub market_concentration: Option<f64>,
    /// Largest bet the wallet has placed on any other market, in USD.
    #[serde(default)]
    pub largest_other_bet_usd: Option<f64>,
}

/// Social-media mention count for the market's keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialMentions {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub count: u32,
    /// Length of the counting window in hours.
    #[serde(default = "default_mention_window")]
    pub window_hours: f64,
}

fn default_mention_window() -> f64 {
    1.0
}

/// Two markets whose probability series move together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub market_a: String,
    pub market_b: String,
    /// Pearson coefficient (-1.0–1.0).
    pub coefficient: f64,
    /// Number of synchronized samples the coefficient was computed on.
    #[serde(default)]
    pub samples: usize,
}

impl CorrelatedPair {
    pub fn involves(&self, market_id: &str) -> bool {
        self.market_a == market_id || self.market_b == market_id
    }

    /// The counterpart of `market_id` in this pair, if it is part of it.
    pub fn other(&self, market_id: &str) -> Option<&str> {
        if self.market_a == market_id {
            Some(&self.market_b)
        } else if self.market_b == market_id {
            Some(&self.market_a)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle input feed
// ---------------------------------------------------------------------------

/// Everything the data layer gathered about one market for this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFeed {
    pub snapshot: MarketSnapshot,
    #[serde(default)]
    pub references: Vec<ExternalReference>,
    /// `None` when the blockchain monitor produced nothing for this market.
    #[serde(default)]
    pub wallet_activity: Option<Vec<WalletActivity>>,
    /// `None` when the social monitor is unavailable.
    #[serde(default)]
    pub mentions: Option<SocialMentions>,
}

impl MarketFeed {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot,
            references: Vec::new(),
            wallet_activity: None,
            mentions: None,
        }
    }
}

/// Read-only input for one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleInput {
    pub markets: Vec<MarketFeed>,
    /// Precomputed correlated pairs. `None` means "not computed yet".
    #[serde(default)]
    pub correlations: Option<Vec<CorrelatedPair>>,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Outcome side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    /// +1.0 for YES, -1.0 for NO. Edges are signed in YES terms.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Yes => 1.0,
            Side::No => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Market category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCategory {
    Politics,
    Sports,
    Crypto,
    Economics,
    Culture,
    Other,
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketCategory::Politics => write!(f, "Politics"),
            MarketCategory::Sports => write!(f, "Sports"),
            MarketCategory::Crypto => write!(f, "Crypto"),
            MarketCategory::Economics => write!(f, "Economics"),
            MarketCategory::Culture => write!(f, "Culture"),
            MarketCategory::Other => write!(f, "Other"),
        }
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// A position the operator opened after acting on an earlier decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub market_id: String,
    pub side: Side,
    /// Amount staked in USD.
    pub stake: Decimal,
    /// YES probability when the position was opened.
    pub entry_probability: f64,
    #[serde(default)]
    pub correlated_market_id: Option<String>,
}

impl fmt::Display for OpenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ${:.2} @ {:.0}¢",
            self.side,
            self.market_id,
            self.stake,
            self.entry_probability * 100.0,
        )
    }
}

impl OpenPosition {
    /// Probability of the held side winning, given the market's YES probability.
    pub fn held_probability(&self, yes_probability: f64) -> f64 {
        match self.side {
            Side::Yes => yes_probability,
            Side::No => 1.0 - yes_probability,
        }
    }

    /// Held-side probability at entry.
    pub fn entry_held_probability(&self) -> f64 {
        self.held_probability(self.entry_probability)
    }
}

/// Bankroll and open positions, loaned to the engine for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub bankroll: Decimal,
    #[serde(default)]
    pub positions: Vec<OpenPosition>,
}

impl PortfolioState {
    pub fn new(bankroll: Decimal) -> Self {
        Self {
            bankroll,
            positions: Vec::new(),
        }
    }

    /// Aggregate exposure: the sum of all open stakes.
    pub fn exposure(&self) -> Decimal {
        self.positions.iter().map(|p| p.stake).sum()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Room left under an exposure cap expressed as a bankroll fraction.
    /// Never negative.
    pub fn headroom(&self, max_exposure_pct: Decimal) -> Decimal {
        (self.bankroll * max_exposure_pct - self.exposure()).max(Decimal::ZERO)
    }

    /// Exposure as a fraction of bankroll (0.0 when the bankroll is empty).
    pub fn exposure_pct(&self) -> f64 {
        if self.bankroll <= Decimal::ZERO {
            0.0
        } else {
            (self.exposure() / self.bankroll).to_f64().unwrap_or(0.0)
        }
    }
}

/// Convert an f64 dollar amount into cents, rounding toward zero.
/// Binary noise below 1e-6 is rounded away first so 624.9999999999999
/// still lands on 625.00. Non-finite inputs map to zero.
pub fn usd(amount: f64) -> Decimal {
    Decimal::from_f64(amount)
        .unwrap_or(Decimal::ZERO)
        .round_dp(6)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Slack for comparing derived probabilities and ratios with configured
/// thresholds. A nominal 12-point gap such as 0.35 - 0.23 computes to
/// 0.11999..., and must still count as 12 points.
pub const THRESHOLD_EPSILON: f64 = 1e-9;

/// `value >= threshold`, ignoring binary noise at the boundary.
pub fn reaches(value: f64, threshold: f64) -> bool {
    value + THRESHOLD_EPSILON >= threshold
}

/// `value <= limit`, ignoring binary noise at the boundary.
pub fn within(value: f64, limit: f64) -> bool {
    value <= limit + THRESHOLD_EPSILON
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors the engine surfaces to its caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A threshold is out of its valid range. Fatal before a cycle starts.
    #[error("Invalid configuration ({field}): {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// One market's input is malformed. Only that market is skipped.
    #[error("Invalid snapshot for market {market_id}: {reason}")]
    InvalidSnapshot { market_id: String, reason: String },
}

impl EngineError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
