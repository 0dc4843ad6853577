//! Signal detectors.
//!
//! Each detector inspects one market's context and emits zero or more
//! `Signal`s. Detectors are pure: they see only the read-only cycle input,
//! never each other's output, and never the wall clock.

pub mod correlation;
pub mod divergence;
pub mod signal;
pub mod social;
pub mod volume;
pub mod wallet;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{
    CorrelatedPair, EngineError, ExternalReference, MarketFeed, MarketSnapshot, SocialMentions,
    WalletActivity,
};

pub use correlation::{CorrelationConfig, CorrelationDetector};
pub use divergence::{DivergenceConfig, DivergenceDetector};
pub use signal::{Signal, SignalKind, SignalPayload};
pub use social::{SocialConfig, SocialSpikeDetector};
pub use volume::{VolumeSpikeConfig, VolumeSpikeDetector};
pub use wallet::{WalletConfig, WalletDetector};

// ---------------------------------------------------------------------------
// Detector trait
// ---------------------------------------------------------------------------

/// Everything a detector may look at for one market.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub references: &'a [ExternalReference],
    pub wallet_activity: Option<&'a [WalletActivity]>,
    pub mentions: Option<&'a SocialMentions>,
    /// All correlated pairs known for this cycle.
    pub pairs: &'a [CorrelatedPair],
    /// Every valid snapshot in the cycle, keyed by market id.
    pub peers: &'a HashMap<&'a str, &'a MarketSnapshot>,
}

impl<'a> MarketContext<'a> {
    pub fn from_feed(
        feed: &'a MarketFeed,
        pairs: &'a [CorrelatedPair],
        peers: &'a HashMap<&'a str, &'a MarketSnapshot>,
    ) -> Self {
        Self {
            snapshot: &feed.snapshot,
            references: &feed.references,
            wallet_activity: feed.wallet_activity.as_deref(),
            mentions: feed.mentions.as_ref(),
            pairs,
            peers,
        }
    }
}

/// A stateless signal detector.
pub trait SignalDetector: Send + Sync {
    /// The kind of signal this detector emits.
    fn kind(&self) -> SignalKind;

    /// Inspect one market. An empty result means "nothing unusual".
    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal>;
}

/// Convert fractional hours into a chrono duration. `None` when the value
/// is not finite or does not fit in a `Duration`.
pub(crate) fn hours(h: f64) -> Option<Duration> {
    let ms = (h * 3_600_000.0).round();
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(ms as i64)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Thresholds for every detector, one TOML table each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub volume: VolumeSpikeConfig,
    pub divergence: DivergenceConfig,
    pub wallet: WalletConfig,
    pub social: SocialConfig,
    pub correlation: CorrelationConfig,
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.volume.validate()?;
        self.divergence.validate()?;
        self.wallet.validate()?;
        self.social.validate()?;
        self.correlation.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector set
// ---------------------------------------------------------------------------

/// The enabled detectors, run in a fixed order.
pub struct DetectorSet {
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl DetectorSet {
    pub fn new(detectors: Vec<Box<dyn SignalDetector>>) -> Self {
        Self { detectors }
    }

    /// Build the enabled detectors from configuration.
    pub fn from_config(config: &DetectorConfig) -> Self {
        let mut detectors: Vec<Box<dyn SignalDetector>> = Vec::new();
        if config.volume.enabled {
            detectors.push(Box::new(VolumeSpikeDetector::new(config.volume.clone())));
        }
        if config.divergence.enabled {
            detectors.push(Box::new(DivergenceDetector::new(config.divergence.clone())));
        }
        if config.wallet.enabled {
            detectors.push(Box::new(WalletDetector::new(config.wallet.clone())));
        }
        if config.social.enabled {
            detectors.push(Box::new(SocialSpikeDetector::new(config.social.clone())));
        }
        if config.correlation.enabled {
            detectors.push(Box::new(CorrelationDetector::new(config.correlation.clone())));
        }
        Self { detectors }
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn kinds(&self) -> Vec<SignalKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Run every detector against one market.
    pub fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        self.detectors.iter().flat_map(|d| d.detect(ctx)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
