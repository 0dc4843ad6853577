//! Correlated-market divergence.
//!
//! When two strongly correlated markets are observed and one has moved
//! sharply since its previous sample while the other barely moved, the
//! quiet one is likely to catch up. Both markets get a signal; only the
//! laggard's carries a directional gap.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::signal::{CorrelationDivergence, CorrelationRole, Signal, SignalKind, SignalPayload};
use super::{MarketContext, SignalDetector};
use crate::types::{reaches, EngineError};

/// Longest trailing window accepted for pair discovery (ten years).
pub const MAX_WINDOW_DAYS: i64 = 3_650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub enabled: bool,
    /// Minimum |coefficient| for a pair to count as correlated.
    pub min_coefficient: f64,
    /// A market "moved" when its probability changed by at least this much.
    pub move_delta: f64,
    /// The other market "stayed put" below `move_delta × proportional_factor`.
    pub proportional_factor: f64,
    /// Trailing window for computing pairs from probability history.
    pub window_days: i64,
    /// Fewer shared samples than this and a pair is not evaluated.
    pub min_overlap_samples: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_coefficient: 0.7,
            move_delta: 0.05,
            proportional_factor: 0.5,
            window_days: 7,
            min_overlap_samples: 5,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.min_coefficient > 0.0 && self.min_coefficient <= 1.0) {
            return Err(EngineError::config("correlation.min_coefficient", "must be in (0, 1]"));
        }
        if !(self.move_delta > 0.0 && self.move_delta < 1.0) {
            return Err(EngineError::config("correlation.move_delta", "must be in (0, 1)"));
        }
        if !(self.proportional_factor > 0.0 && self.proportional_factor < 1.0) {
            return Err(EngineError::config(
                "correlation.proportional_factor",
                "must be in (0, 1)",
            ));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            return Err(EngineError::config("correlation.window_days", "must be in [1, 3650]"));
        }
        if self.min_overlap_samples < 3 {
            return Err(EngineError::config(
                "correlation.min_overlap_samples",
                "must be at least 3",
            ));
        }
        Ok(())
    }

    /// Move below which a market counts as not having followed.
    pub fn lag_limit(&self) -> f64 {
        self.move_delta * self.proportional_factor
    }
}

pub struct CorrelationDetector {
    config: CorrelationConfig,
}

impl CorrelationDetector {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    fn role(&self, own_move: f64, pair_move: f64) -> Option<CorrelationRole> {
        let (own, pair) = (own_move.abs(), pair_move.abs());
        let moved = |m: f64| reaches(m, self.config.move_delta);
        let stayed = |m: f64| !reaches(m, self.config.lag_limit());
        if moved(own) && stayed(pair) {
            Some(CorrelationRole::Leader)
        } else if moved(pair) && stayed(own) {
            Some(CorrelationRole::Laggard)
        } else {
            None
        }
    }
}

impl SignalDetector for CorrelationDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::CorrelationDivergence
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        let s = ctx.snapshot;
        let Some(own_move) = s.probability_move() else {
            return Vec::new();
        };

        let mut signals = Vec::new();
        for pair in ctx.pairs {
            let strong = pair.coefficient.is_finite()
                && reaches(pair.coefficient.abs(), self.config.min_coefficient);
            if !strong {
                continue;
            }
            let Some(other_id) = pair.other(&s.id) else {
                continue;
            };
            let Some(other) = ctx.peers.get(other_id) else {
                debug!(market_id = %s.id, pair = %other_id, "Correlated market not in this cycle");
                continue;
            };
            let Some(pair_move) = other.probability_move() else {
                continue;
            };
            let Some(role) = self.role(own_move, pair_move) else {
                continue;
            };

            let strength = (own_move.abs() - pair_move.abs()).abs();
            let rationale = match role {
                CorrelationRole::Leader => format!(
                    "Moved {:+.1} pts while correlated {} (r={:.2}) moved {:+.1} pts",
                    own_move * 100.0,
                    other_id,
                    pair.coefficient,
                    pair_move * 100.0,
                ),
                CorrelationRole::Laggard => format!(
                    "Lagging correlated {} (r={:.2}): it moved {:+.1} pts, this market {:+.1} pts",
                    other_id,
                    pair.coefficient,
                    pair_move * 100.0,
                    own_move * 100.0,
                ),
            };

            signals.push(Signal::new(
                s.id.clone(),
                strength,
                rationale,
                SignalPayload::CorrelationDivergence(CorrelationDivergence {
                    pair_market_id: other_id.to_string(),
                    coefficient: pair.coefficient,
                    own_move,
                    pair_move,
                    role,
                }),
            ));
        }
        signals
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
