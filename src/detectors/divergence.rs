//! Cross-venue probability divergence.
//!
//! Compares the market's YES probability with independent forecasts for
//! the same event. Each reference is judged on its own, so two venues that
//! both disagree produce two signals.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::signal::{ProbabilityDivergence, Signal, SignalKind, SignalPayload};
use super::{MarketContext, SignalDetector};
use crate::types::{reaches, EngineError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    pub enabled: bool,
    /// Minimum absolute probability gap, in probability points (0.12 = 12 pts).
    pub threshold: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.12,
        }
    }
}

impl DivergenceConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(EngineError::config("divergence.threshold", "must be in (0, 1)"));
        }
        Ok(())
    }
}

pub struct DivergenceDetector {
    config: DivergenceConfig,
}

impl DivergenceDetector {
    pub fn new(config: DivergenceConfig) -> Self {
        Self { config }
    }
}

impl SignalDetector for DivergenceDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::ProbabilityDivergence
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        let s = ctx.snapshot;
        let mut signals = Vec::new();

        for reference in ctx.references {
            let p = reference.probability;
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                debug!(
                    market_id = %s.id,
                    source = %reference.source,
                    probability = p,
                    "Ignoring malformed reference"
                );
                continue;
            }

            let magnitude = (s.probability - p).abs();
            if !reaches(magnitude, self.config.threshold) {
                continue;
            }

            let rationale = format!(
                "Probability divergence with {}: market {:.1}% vs {:.1}% ({:.1} pts)",
                reference.source,
                s.probability * 100.0,
                p * 100.0,
                magnitude * 100.0,
            );

            signals.push(Signal::new(
                s.id.clone(),
                magnitude,
                rationale,
                SignalPayload::ProbabilityDivergence(ProbabilityDivergence {
                    source: reference.source.clone(),
                    market_probability: s.probability,
                    reference_probability: p,
                }),
            ));
        }

        signals
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
