//! Social-media mention spikes.

use serde::{Deserialize, Serialize};

use super::signal::{Signal, SignalKind, SignalPayload, SocialSpike};
use super::{MarketContext, SignalDetector};
use crate::types::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub enabled: bool,
    /// Mentions within `window_hours` needed to fire.
    pub min_mentions: u32,
    pub window_hours: f64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_mentions: 15,
            window_hours: 1.0,
        }
    }
}

impl SocialConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_mentions == 0 {
            return Err(EngineError::config("social.min_mentions", "must be at least 1"));
        }
        if !(self.window_hours.is_finite() && self.window_hours > 0.0) {
            return Err(EngineError::config("social.window_hours", "must be positive"));
        }
        Ok(())
    }
}

pub struct SocialSpikeDetector {
    config: SocialConfig,
}

impl SocialSpikeDetector {
    pub fn new(config: SocialConfig) -> Self {
        Self { config }
    }
}

impl SignalDetector for SocialSpikeDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::SocialSpike
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        let Some(mentions) = ctx.mentions else {
            return Vec::new();
        };
        if !(mentions.window_hours.is_finite() && mentions.window_hours > 0.0) {
            return Vec::new();
        }

        // Counts from a differently sized window are rescaled to ours.
        let normalised = if mentions.window_hours == self.config.window_hours {
            f64::from(mentions.count)
        } else {
            f64::from(mentions.count) * self.config.window_hours / mentions.window_hours
        };
        let threshold = f64::from(self.config.min_mentions);
        if normalised < threshold {
            return Vec::new();
        }

        let keywords = if mentions.keywords.is_empty() {
            "market keywords".to_string()
        } else {
            mentions.keywords.join(", ")
        };

        vec![Signal::new(
            ctx.snapshot.id.clone(),
            normalised / threshold,
            format!(
                "Social spike: {} mentions of {} in {}h",
                mentions.count, keywords, mentions.window_hours
            ),
            SignalPayload::SocialSpike(SocialSpike {
                keywords: mentions.keywords.clone(),
                mentions: mentions.count,
                normalised_mentions: normalised,
                threshold: self.config.min_mentions,
            }),
        )]
    }
}
