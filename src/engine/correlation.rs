//! Correlated-pair discovery.
//!
//! Pearson correlation of two markets' YES-probability histories over a
//! trailing window, matched on timestamps present in both series. Used by
//! the pipeline when the feed does not supply precomputed pairs.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::detectors::CorrelationConfig;
use crate::types::{CorrelatedPair, MarketSnapshot};

/// Pearson correlation coefficient. `None` on mismatched lengths, fewer
/// than two samples, or a constant series.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }

    Some((cov / denom).clamp(-1.0, 1.0))
}

pub struct CorrelationAnalyzer {
    /// `None` when the configured window does not fit in a `Duration`.
    window: Option<Duration>,
    min_overlap_samples: usize,
    min_coefficient: f64,
}

impl CorrelationAnalyzer {
    pub fn new(config: &CorrelationConfig) -> Self {
        Self {
            window: Duration::try_days(config.window_days),
            min_overlap_samples: config.min_overlap_samples,
            min_coefficient: config.min_coefficient,
        }
    }

    fn series(&self, s: &MarketSnapshot, as_of: DateTime<Utc>) -> BTreeMap<DateTime<Utc>, f64> {
        let Some(from) = self.window.and_then(|w| as_of.checked_sub_signed(w)) else {
            return BTreeMap::new();
        };
        s.probability_history
            .iter()
            .filter(|p| p.at >= from && p.at <= as_of && p.probability.is_finite())
            .map(|p| (p.at, p.probability))
            .collect()
    }

    /// Coefficient for two markets, or `None` when there is too little
    /// shared history or either series is flat.
    pub fn correlation(
        &self,
        a: &MarketSnapshot,
        b: &MarketSnapshot,
        as_of: DateTime<Utc>,
    ) -> Option<(f64, usize)> {
        let sa = self.series(a, as_of);
        let sb = self.series(b, as_of);

        let (xs, ys): (Vec<f64>, Vec<f64>) = sa
            .iter()
            .filter_map(|(at, pa)| sb.get(at).map(|pb| (*pa, *pb)))
            .unzip();

        if xs.len() < self.min_overlap_samples {
            return None;
        }
        pearson(&xs, &ys).map(|c| (c, xs.len()))
    }

    /// Every pair whose |coefficient| reaches the threshold, ordered by
    /// market id. The window ends at the latest observation among the
    /// snapshots.
    pub fn find_pairs(&self, snapshots: &[&MarketSnapshot]) -> Vec<CorrelatedPair> {
        let Some(as_of) = snapshots.iter().map(|s| s.observed_at).max() else {
            return Vec::new();
        };

        let mut sorted: Vec<&MarketSnapshot> = snapshots.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);

        let mut pairs = Vec::new();
        for (i, a) in sorted.iter().enumerate() {
            for b in &sorted[i + 1..] {
                let Some((coefficient, samples)) = self.correlation(a, b, as_of) else {
                    continue;
                };
                if coefficient.abs() >= self.min_coefficient {
                    pairs.push(CorrelatedPair {
                        market_a: a.id.clone(),
                        market_b: b.id.clone(),
                        coefficient,
                        samples,
                    });
                }
            }
        }

        debug!(markets = sorted.len(), pairs = pairs.len(), "Computed correlated pairs");
        pairs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
