//! Volume spike detection.
//!
//! Flags markets whose recent traded volume runs well above their own
//! trailing baseline. Thinly traded (niche) markets use a lower multiplier
//! since a modest absolute surge is already meaningful there.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::signal::{Signal, SignalKind, SignalPayload, VolumeSpike};
use super::{hours, MarketContext, SignalDetector};
use crate::types::{reaches, EngineError};

/// Longest window or baseline accepted from configuration (one year).
pub const MAX_WINDOW_HOURS: f64 = 8_760.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSpikeConfig {
    pub enabled: bool,
    /// Length of the recent window, ending at the observation time.
    pub window_hours: f64,
    /// Length of the baseline, ending where the recent window starts.
    pub baseline_hours: f64,
    /// Window volume must reach this multiple of the scaled baseline.
    pub multiplier: f64,
    /// Markets with less liquidity than this count as niche.
    pub niche_liquidity_ceiling: f64,
    /// Applied to `multiplier` for niche markets.
    pub niche_multiplier_factor: f64,
    /// Fewer baseline buckets than this means "not enough history".
    pub min_baseline_buckets: usize,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_hours: 4.0,
            baseline_hours: 24.0,
            multiplier: 4.0,
            niche_liquidity_ceiling: 25_000.0,
            niche_multiplier_factor: 0.75,
            min_baseline_buckets: 2,
        }
    }
}

impl VolumeSpikeConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.window_hours > 0.0 && self.window_hours <= MAX_WINDOW_HOURS) {
            return Err(EngineError::config("volume.window_hours", "must be in (0, 8760]"));
        }
        if !(self.baseline_hours > 0.0 && self.baseline_hours <= MAX_WINDOW_HOURS) {
            return Err(EngineError::config("volume.baseline_hours", "must be in (0, 8760]"));
        }
        if !(self.multiplier.is_finite() && self.multiplier > 1.0) {
            return Err(EngineError::config("volume.multiplier", "must be greater than 1"));
        }
        if !(self.niche_multiplier_factor > 0.0 && self.niche_multiplier_factor <= 1.0) {
            return Err(EngineError::config(
                "volume.niche_multiplier_factor",
                "must be in (0, 1]",
            ));
        }
        if !(self.niche_liquidity_ceiling.is_finite() && self.niche_liquidity_ceiling >= 0.0) {
            return Err(EngineError::config(
                "volume.niche_liquidity_ceiling",
                "must be non-negative",
            ));
        }
        Ok(())
    }

    /// Multiplier in force for a market with the given liquidity.
    pub fn effective_multiplier(&self, liquidity: f64) -> f64 {
        if self.is_niche(liquidity) {
            self.multiplier * self.niche_multiplier_factor
        } else {
            self.multiplier
        }
    }

    pub fn is_niche(&self, liquidity: f64) -> bool {
        liquidity < self.niche_liquidity_ceiling
    }
}

pub struct VolumeSpikeDetector {
    config: VolumeSpikeConfig,
}

impl VolumeSpikeDetector {
    pub fn new(config: VolumeSpikeConfig) -> Self {
        Self { config }
    }
}

impl SignalDetector for VolumeSpikeDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::VolumeSpike
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        let s = ctx.snapshot;
        let cfg = &self.config;

        let Some(window_start) = hours(cfg.window_hours)
            .and_then(|h| s.observed_at.checked_sub_signed(h))
        else {
            debug!(market_id = %s.id, window_hours = cfg.window_hours, "Window out of range");
            return Vec::new();
        };
        let Some(baseline_start) = hours(cfg.baseline_hours)
            .and_then(|h| window_start.checked_sub_signed(h))
        else {
            debug!(market_id = %s.id, baseline_hours = cfg.baseline_hours, "Baseline out of range");
            return Vec::new();
        };

        let (window_volume, _) = s.volume_between(window_start, s.observed_at);
        let (baseline_total, buckets) = s.volume_between(baseline_start, window_start);

        if buckets < cfg.min_baseline_buckets {
            debug!(market_id = %s.id, buckets, "Not enough volume history for a baseline");
            return Vec::new();
        }

        // Scale the baseline to the window length.
        let baseline_volume = baseline_total * cfg.window_hours / cfg.baseline_hours;
        if baseline_volume <= 0.0 {
            return Vec::new();
        }

        let ratio = window_volume / baseline_volume;
        let effective_multiplier = cfg.effective_multiplier(s.liquidity);
        if !reaches(ratio, effective_multiplier) {
            return Vec::new();
        }

        let niche = cfg.is_niche(s.liquidity);
        let window_move = s
            .probability_at_or_before(window_start)
            .map(|p| s.probability - p)
            .unwrap_or(0.0);

        let rationale = format!(
            "Volume spike: {:.1}x baseline (${:.0} vs ${:.0} over {}h){}",
            ratio,
            window_volume,
            baseline_volume,
            cfg.window_hours,
            if niche { ", niche market" } else { "" },
        );

        debug!(market_id = %s.id, ratio = %format!("{:.2}", ratio), "Volume spike");

        vec![Signal::new(
            s.id.clone(),
            ratio,
            rationale,
            SignalPayload::VolumeSpike(VolumeSpike {
                window_volume,
                baseline_volume,
                ratio,
                effective_multiplier,
                niche,
                window_move,
            }),
        )]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
