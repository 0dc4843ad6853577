//! Smart-money, fresh-wallet and outsized-trade detection.
//!
//! Independent checks run over the market's observed trades:
//!
//! - **Smart wallet**: a long, profitable trading history placing a sizeable
//!   trade.
//! - **Fresh wallet**: a brand-new wallet that puts a large bet on one market
//!   and almost nothing anywhere else, the classic insider footprint.
//! - **Outsized trade**: a trade many times the market's median trade size
//!   this cycle, whoever placed it.
//!
//! Unknown wallet facts never count in a wallet's favour: a check that needs
//! a missing value does not fire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::signal::{Signal, SignalKind, SignalPayload, WalletPattern, WalletSignal};
use super::{MarketContext, SignalDetector};
use crate::types::{EngineError, WalletActivity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub enabled: bool,
    pub smart_min_trades: u32,
    pub smart_min_success_rate: f64,
    pub smart_min_size_usd: f64,
    pub fresh_max_age_hours: f64,
    pub fresh_min_size_usd: f64,
    pub fresh_max_trades: u32,
    /// Minimum share of the wallet's activity on this market.
    pub fresh_min_concentration: f64,
    pub outsized_min_size_usd: f64,
    /// An outsized trade is at least this multiple of the median trade.
    pub outsized_multiple: f64,
    /// Fewer trades on the market than this and there is no median to beat.
    pub outsized_min_trades: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smart_min_trades: 10,
            smart_min_success_rate: 0.70,
            smart_min_size_usd: 1_000.0,
            fresh_max_age_hours: 72.0,
            fresh_min_size_usd: 5_000.0,
            fresh_max_trades: 3,
            fresh_min_concentration: 0.80,
            outsized_min_size_usd: 1_000.0,
            outsized_multiple: 5.0,
            outsized_min_trades: 3,
        }
    }
}

impl WalletConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.smart_min_success_rate) {
            return Err(EngineError::config("wallet.smart_min_success_rate", "must be in [0, 1]"));
        }
        if !(self.smart_min_size_usd.is_finite() && self.smart_min_size_usd > 0.0) {
            return Err(EngineError::config("wallet.smart_min_size_usd", "must be positive"));
        }
        if !(self.fresh_min_size_usd.is_finite() && self.fresh_min_size_usd > 0.0) {
            return Err(EngineError::config("wallet.fresh_min_size_usd", "must be positive"));
        }
        if self.fresh_max_age_hours.is_nan() || self.fresh_max_age_hours < 0.0 {
            return Err(EngineError::config("wallet.fresh_max_age_hours", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.fresh_min_concentration) {
            return Err(EngineError::config("wallet.fresh_min_concentration", "must be in [0, 1]"));
        }
        if !(self.outsized_min_size_usd.is_finite() && self.outsized_min_size_usd > 0.0) {
            return Err(EngineError::config("wallet.outsized_min_size_usd", "must be positive"));
        }
        if !(self.outsized_multiple.is_finite() && self.outsized_multiple > 1.0) {
            return Err(EngineError::config("wallet.outsized_multiple", "must be greater than 1"));
        }
        if self.outsized_min_trades < 2 {
            return Err(EngineError::config("wallet.outsized_min_trades", "must be at least 2"));
        }
        Ok(())
    }

    /// Whether a trade matches the smart-wallet profile.
    pub fn is_smart(&self, a: &WalletActivity) -> bool {
        let (Some(trades), Some(rate)) = (a.trade_count, a.success_rate) else {
            return false;
        };
        trades >= self.smart_min_trades
            && rate >= self.smart_min_success_rate
            && a.size_usd >= self.smart_min_size_usd
    }

    /// Whether a trade matches the fresh-wallet profile. All five
    /// conditions must hold and all of them must be known.
    pub fn is_fresh(&self, a: &WalletActivity) -> bool {
        let (Some(age), Some(trades), Some(concentration), Some(largest_other)) = (
            a.wallet_age_hours,
            a.trade_count,
            a.market_concentration,
            a.largest_other_bet_usd,
        ) else {
            return false;
        };
        age <= self.fresh_max_age_hours
            && a.size_usd >= self.fresh_min_size_usd
            && trades <= self.fresh_max_trades
            && concentration >= self.fresh_min_concentration
            && largest_other < self.fresh_min_size_usd
    }

    /// Whether a trade dwarfs the market's median trade. `None` for the
    /// median means too few trades to tell.
    pub fn is_outsized(&self, a: &WalletActivity, median: Option<f64>) -> bool {
        let Some(median) = median.filter(|m| *m > 0.0) else {
            return false;
        };
        a.size_usd >= self.outsized_min_size_usd && a.size_usd >= median * self.outsized_multiple
    }

    fn min_size(&self, pattern: WalletPattern) -> f64 {
        match pattern {
            WalletPattern::Smart => self.smart_min_size_usd,
            WalletPattern::Fresh => self.fresh_min_size_usd,
            WalletPattern::Outsized => self.outsized_min_size_usd,
        }
    }
}

/// Median of the finite trade sizes, when there are at least `min_trades`.
fn median_size(trades: &[&WalletActivity], min_trades: usize) -> Option<f64> {
    let mut sizes: Vec<f64> = trades.iter().map(|a| a.size_usd).filter(|s| s.is_finite()).collect();
    if sizes.len() < min_trades || sizes.is_empty() {
        return None;
    }
    sizes.sort_by(f64::total_cmp);
    let mid = sizes.len() / 2;
    Some(if sizes.len() % 2 == 0 {
        (sizes[mid - 1] + sizes[mid]) / 2.0
    } else {
        sizes[mid]
    })
}

pub struct WalletDetector {
    config: WalletConfig,
}

impl WalletDetector {
    pub fn new(config: WalletConfig) -> Self {
        Self { config }
    }

    fn matches(&self, pattern: WalletPattern, a: &WalletActivity, median: Option<f64>) -> bool {
        match pattern {
            WalletPattern::Smart => self.config.is_smart(a),
            WalletPattern::Fresh => self.config.is_fresh(a),
            WalletPattern::Outsized => self.config.is_outsized(a, median),
        }
    }

    fn to_signal(&self, pattern: WalletPattern, a: &WalletActivity, median: Option<f64>) -> Signal {
        let strength = match (pattern, median) {
            (WalletPattern::Outsized, Some(m)) => a.size_usd / m,
            _ => a.size_usd / self.config.min_size(pattern),
        };
        let rationale = match pattern {
            WalletPattern::Smart => format!(
                "Smart wallet {} bought {} for ${:.0} ({} trades, {:.0}% win rate)",
                a.wallet,
                a.side,
                a.size_usd,
                a.trade_count.unwrap_or(0),
                a.success_rate.unwrap_or(0.0) * 100.0,
            ),
            WalletPattern::Fresh => format!(
                "Fresh wallet {} ({:.0}h old, {} trades) bet ${:.0} on {}, {:.0}% of its activity",
                a.wallet,
                a.wallet_age_hours.unwrap_or(0.0),
                a.trade_count.unwrap_or(0),
                a.size_usd,
                a.side,
                a.market_concentration.unwrap_or(0.0) * 100.0,
            ),
            WalletPattern::Outsized => format!(
                "Outsized trade: {} bought {} for ${:.0}, {:.1}x the median ${:.0}",
                a.wallet,
                a.side,
                a.size_usd,
                strength,
                median.unwrap_or(0.0),
            ),
        };

        Signal::new(
            a.market_id.clone(),
            strength,
            rationale,
            SignalPayload::Wallet(WalletSignal {
                pattern,
                wallet: a.wallet.clone(),
                side: a.side,
                size_usd: a.size_usd,
                wallet_age_hours: a.wallet_age_hours,
                trade_count: a.trade_count,
                success_rate: a.success_rate,
                market_concentration: a.market_concentration,
                typical_size_usd: match pattern {
                    WalletPattern::Outsized => median,
                    _ => None,
                },
            }),
        )
    }
}

impl SignalDetector for WalletDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::Wallet
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Vec<Signal> {
        let Some(activity) = ctx.wallet_activity else {
            return Vec::new();
        };
        let market_id = ctx.snapshot.id.as_str();

        let trades: Vec<&WalletActivity> =
            activity.iter().filter(|a| a.market_id == market_id).collect();
        let median = median_size(&trades, self.config.outsized_min_trades);

        // Largest qualifying trade per (pattern, wallet).
        let mut best: BTreeMap<(WalletPattern, &str), &WalletActivity> = BTreeMap::new();
        for a in trades {
            if !a.size_usd.is_finite() {
                continue;
            }
            for pattern in [WalletPattern::Smart, WalletPattern::Fresh, WalletPattern::Outsized] {
                if !self.matches(pattern, a, median) {
                    continue;
                }
                best.entry((pattern, a.wallet.as_str()))
                    .and_modify(|current| {
                        if a.size_usd > current.size_usd {
                            *current = a;
                        }
                    })
                    .or_insert(a);
            }
        }

        if !best.is_empty() {
            debug!(market_id = %market_id, wallets = best.len(), "Wallet patterns matched");
        }

        best.into_iter()
            .map(|((pattern, _), a)| self.to_signal(pattern, a, median))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
