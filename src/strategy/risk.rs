//! Risk manager.
//!
//! Gates every sized recommendation against portfolio limits (open position
//! count and aggregate exposure) and reviews open positions once per cycle
//! for hedge and stop-loss triggers. Stateless: all state comes from the
//! borrowed `PortfolioState`.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use super::kelly::SizedRecommendation;
use crate::types::{reaches, within, EngineError, MarketSnapshot, PortfolioState, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_open_positions: usize,
    /// Aggregate exposure cap as a fraction of bankroll.
    pub max_exposure_pct: Decimal,
    /// Held-side probability at which a hedge is suggested.
    pub hedge_threshold: f64,
    /// Hedge size as a fraction of the position's stake.
    pub max_hedge_pct: Decimal,
    /// Held-side probability drop (in points) that triggers a stop-loss.
    pub stop_loss_drop: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 10,
            max_exposure_pct: dec!(0.40),
            hedge_threshold: 0.70,
            max_hedge_pct: dec!(0.20),
            stop_loss_drop: 0.20,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_open_positions == 0 {
            return Err(EngineError::config("risk.max_open_positions", "must be at least 1"));
        }
        if self.max_exposure_pct <= Decimal::ZERO || self.max_exposure_pct > Decimal::ONE {
            return Err(EngineError::config("risk.max_exposure_pct", "must be in (0, 1]"));
        }
        if !(self.hedge_threshold > 0.0 && self.hedge_threshold <= 1.0) {
            return Err(EngineError::config("risk.hedge_threshold", "must be in (0, 1]"));
        }
        if self.max_hedge_pct < Decimal::ZERO || self.max_hedge_pct > Decimal::ONE {
            return Err(EngineError::config("risk.max_hedge_pct", "must be in [0, 1]"));
        }
        if !(self.stop_loss_drop > 0.0 && self.stop_loss_drop < 1.0) {
            return Err(EngineError::config("risk.stop_loss_drop", "must be in (0, 1)"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Why a recommendation was blocked outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    MaxPositionsReached { open: usize, max: usize },
    ZeroStake,
    ExposureCapReached { exposure: Decimal, cap: Decimal },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MaxPositionsReached { open, max } => {
                write!(f, "max open positions reached ({open}/{max})")
            }
            RejectionReason::ZeroStake => write!(f, "zero stake"),
            RejectionReason::ExposureCapReached { exposure, cap } => {
                write!(f, "exposure ${:.2} at cap ${:.2}", exposure, cap)
            }
        }
    }
}

/// Why a recommendation's stake was reduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModificationReason {
    ExposureHeadroom { requested: Decimal, allowed: Decimal },
}

impl fmt::Display for ModificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationReason::ExposureHeadroom { requested, allowed } => {
                write!(f, "stake ${:.2} reduced to ${:.2} exposure headroom", requested, allowed)
            }
        }
    }
}

/// The engine's verdict on one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinalDecision {
    Accepted(SizedRecommendation),
    Rejected {
        recommendation: SizedRecommendation,
        reason: RejectionReason,
    },
    Modified {
        recommendation: SizedRecommendation,
        reason: ModificationReason,
    },
}

impl FinalDecision {
    pub fn recommendation(&self) -> &SizedRecommendation {
        match self {
            FinalDecision::Accepted(rec) => rec,
            FinalDecision::Rejected { recommendation, .. } => recommendation,
            FinalDecision::Modified { recommendation, .. } => recommendation,
        }
    }

    pub fn market_id(&self) -> &str {
        &self.recommendation().opportunity.market_id
    }

    /// Stake the operator may act on (zero when rejected).
    pub fn final_stake(&self) -> Decimal {
        match self {
            FinalDecision::Rejected { .. } => Decimal::ZERO,
            other => other.recommendation().stake,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, FinalDecision::Rejected { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FinalDecision::Accepted(_) => "ACCEPTED",
            FinalDecision::Rejected { .. } => "REJECTED",
            FinalDecision::Modified { .. } => "MODIFIED",
        }
    }
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rec = self.recommendation();
        let opp = &rec.opportunity;
        write!(
            f,
            "[{}] {} {} \"{}\" @ {:.1}% | fair {:.1}% | edge {:+.1} pts | EV {:.1}% | stake ${:.2}",
            self.label(),
            opp.side,
            opp.market_id,
            opp.question,
            opp.market_probability * 100.0,
            opp.fair_probability * 100.0,
            opp.edge * 100.0,
            opp.expected_value * 100.0,
            self.final_stake(),
        )?;
        match self {
            FinalDecision::Rejected { reason, .. } => write!(f, " | rejected: {}", reason)?,
            FinalDecision::Modified { reason, .. } => write!(f, " | {}", reason)?,
            FinalDecision::Accepted(_) => {}
        }
        let sizing = rec.sizing_rationale();
        if !sizing.is_empty() {
            write!(f, " | sizing: {}", sizing)?;
        }
        let rationale = opp.rationale();
        if !rationale.is_empty() {
            write!(f, " | signals: {}", rationale)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Position alerts
// ---------------------------------------------------------------------------

/// Advisory trigger on an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionAlert {
    Hedge {
        market_id: String,
        side: Side,
        held_probability: f64,
        hedge_size: Decimal,
    },
    StopLoss {
        market_id: String,
        side: Side,
        entry_probability: f64,
        held_probability: f64,
        drop: f64,
    },
}

impl PositionAlert {
    pub fn market_id(&self) -> &str {
        match self {
            PositionAlert::Hedge { market_id, .. } | PositionAlert::StopLoss { market_id, .. } => {
                market_id
            }
        }
    }
}

impl fmt::Display for PositionAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionAlert::Hedge { market_id, side, held_probability, hedge_size } => write!(
                f,
                "[HEDGE] {} {} at {:.1}%: hedge ${:.2} on {}",
                side,
                market_id,
                held_probability * 100.0,
                hedge_size,
                side.opposite(),
            ),
            PositionAlert::StopLoss {
                market_id,
                side,
                entry_probability,
                held_probability,
                drop,
            } => write!(
                f,
                "[STOP-LOSS] {} {} fell from {:.1}% to {:.1}% ({:.1} pts)",
                side,
                market_id,
                entry_probability * 100.0,
                held_probability * 100.0,
                drop * 100.0,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Risk manager
// ---------------------------------------------------------------------------

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Gate a recommendation against the portfolio.
    pub fn evaluate(&self, rec: SizedRecommendation, portfolio: &PortfolioState) -> FinalDecision {
        let cfg = &self.config;
        let open = portfolio.open_count();

        if open >= cfg.max_open_positions {
            return FinalDecision::Rejected {
                recommendation: rec,
                reason: RejectionReason::MaxPositionsReached {
                    open,
                    max: cfg.max_open_positions,
                },
            };
        }

        if rec.stake <= Decimal::ZERO {
            return FinalDecision::Rejected {
                recommendation: rec,
                reason: RejectionReason::ZeroStake,
            };
        }

        let headroom = portfolio.headroom(cfg.max_exposure_pct);
        if headroom <= Decimal::ZERO {
            return FinalDecision::Rejected {
                recommendation: rec,
                reason: RejectionReason::ExposureCapReached {
                    exposure: portfolio.exposure(),
                    cap: portfolio.bankroll * cfg.max_exposure_pct,
                },
            };
        }

        if rec.stake > headroom {
            let allowed = headroom.round_dp_with_strategy(2, RoundingStrategy::ToZero);
            if allowed <= Decimal::ZERO {
                return FinalDecision::Rejected {
                    recommendation: rec,
                    reason: RejectionReason::ExposureCapReached {
                        exposure: portfolio.exposure(),
                        cap: portfolio.bankroll * cfg.max_exposure_pct,
                    },
                };
            }
            debug!(
                market_id = %rec.opportunity.market_id,
                requested = format!("${:.2}", rec.stake),
                allowed = format!("${:.2}", allowed),
                "Stake reduced to exposure headroom"
            );
            let reason = ModificationReason::ExposureHeadroom {
                requested: rec.stake,
                allowed,
            };
            return FinalDecision::Modified {
                recommendation: rec.with_stake(allowed),
                reason,
            };
        }

        FinalDecision::Accepted(rec)
    }

    /// Hedge and stop-loss triggers for open positions. Positions whose
    /// market is not in `snapshots` are skipped.
    pub fn review_positions(
        &self,
        portfolio: &PortfolioState,
        snapshots: &HashMap<&str, &MarketSnapshot>,
    ) -> Vec<PositionAlert> {
        let cfg = &self.config;
        let mut alerts = Vec::new();

        for pos in &portfolio.positions {
            let Some(snapshot) = snapshots.get(pos.market_id.as_str()) else {
                continue;
            };
            let held = pos.held_probability(snapshot.probability);
            let entry = pos.entry_held_probability();

            if reaches(held, cfg.hedge_threshold) {
                let hedge_size = (pos.stake * cfg.max_hedge_pct)
                    .round_dp_with_strategy(2, RoundingStrategy::ToZero);
                info!(
                    market_id = %pos.market_id,
                    held = format!("{:.1}%", held * 100.0),
                    hedge = format!("${:.2}", hedge_size),
                    "Hedge suggested"
                );
                alerts.push(PositionAlert::Hedge {
                    market_id: pos.market_id.clone(),
                    side: pos.side,
                    held_probability: held,
                    hedge_size,
                });
            }

            let drop = entry - held;
            if !within(drop, cfg.stop_loss_drop) {
                info!(
                    market_id = %pos.market_id,
                    entry = format!("{:.1}%", entry * 100.0),
                    now = format!("{:.1}%", held * 100.0),
                    "Stop-loss triggered"
                );
                alerts.push(PositionAlert::StopLoss {
                    market_id: pos.market_id.clone(),
                    side: pos.side,
                    entry_probability: entry,
                    held_probability: held,
                    drop,
                });
            }
        }

        alerts
    }
}

// ---------------------------------------------------------------------------
// Portfolio summary
// ---------------------------------------------------------------------------

/// Point-in-time view of portfolio risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub bankroll: Decimal,
    pub total_exposure: Decimal,
    pub exposure_pct: f64,
    pub open_positions: usize,
    pub max_positions: usize,
    pub max_exposure_pct: Decimal,
    /// Remaining room under the exposure cap.
    pub available_capital: Decimal,
}

impl PortfolioSummary {
    pub fn new(portfolio: &PortfolioState, config: &RiskConfig) -> Self {
        Self {
            bankroll: portfolio.bankroll,
            total_exposure: portfolio.exposure(),
            exposure_pct: portfolio.exposure_pct(),
            open_positions: portfolio.open_count(),
            max_positions: config.max_open_positions,
            max_exposure_pct: config.max_exposure_pct,
            available_capital: portfolio.headroom(config.max_exposure_pct),
        }
    }
}

impl fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bankroll ${:.2} | exposure ${:.2} ({:.1}%) | positions {}/{} | available ${:.2}",
            self.bankroll,
            self.total_exposure,
            self.exposure_pct * 100.0,
            self.open_positions,
            self.max_positions,
            self.available_capital,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::edge::{opportunity_id, Opportunity};
    use crate::types::{MarketCategory, OpenPosition};
    use chrono::{TimeZone, Utc};

    fn make_rec(stake: Decimal) -> SizedRecommendation {
        let observed_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        SizedRecommendation {
            opportunity: Opportunity {
                id: opportunity_id("m1", observed_at),
                market_id: "m1".into(),
                question: "Will the bill pass?".into(),
                category: MarketCategory::Politics,
                market_probability: 0.20,
                fair_probability: 0.30,
                edge: 0.10,
                side: Side::Yes,
                expected_value: 0.5,
                liquidity: 20_000.0,
                days_to_resolution: 60.0,
                observed_at,
                signals: Vec::new(),
            },
            kelly_fraction: 0.125,
            applied_fraction: 0.0625,
            raw_stake: stake,
            stake,
            notes: Vec::new(),
        }
    }

    fn make_position(market_id: &str, side: Side, stake: Decimal, entry: f64) -> OpenPosition {
        OpenPosition {
            market_id: market_id.into(),
            side,
            stake,
            entry_probability: entry,
            correlated_market_id: None,
        }
    }

    fn make_snapshot(id: &str, probability: f64) -> MarketSnapshot {
        MarketSnapshot {
            id: id.into(),
            question: String::new(),
            category: MarketCategory::Other,
            probability,
            liquidity: 10_000.0,
            volume_history: Vec::new(),
            probability_history: Vec::new(),
            days_to_resolution: 60.0,
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    #[test]
    fn test_accepts_within_limits() {
        let decision = manager().evaluate(make_rec(dec!(625)), &PortfolioState::new(dec!(10000)));
        assert!(matches!(decision, FinalDecision::Accepted(_)));
        assert_eq!(decision.final_stake(), dec!(625));
    }

    #[test]
    fn test_max_positions_rejects() {
        let mut portfolio = PortfolioState::new(dec!(100000));
        for i in 0..10 {
            portfolio.positions.push(make_position(&format!("p{i}"), Side::Yes, dec!(10), 0.5));
        }
        let decision = manager().evaluate(make_rec(dec!(100)), &portfolio);
        assert!(matches!(
            decision,
            FinalDecision::Rejected {
                reason: RejectionReason::MaxPositionsReached { open: 10, max: 10 },
                ..
            }
        ));
        assert_eq!(decision.final_stake(), Decimal::ZERO);
    }

    #[test]
    fn test_zero_stake_rejects() {
        let portfolio = PortfolioState::new(dec!(10000));
        let decision = manager().evaluate(make_rec(Decimal::ZERO), &portfolio);
        assert!(matches!(
            decision,
            FinalDecision::Rejected { reason: RejectionReason::ZeroStake, .. }
        ));
    }

    #[test]
    fn test_exposure_cap_rejects() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("p1", Side::Yes, dec!(4000), 0.5));
        let decision = manager().evaluate(make_rec(dec!(100)), &portfolio);
        assert!(matches!(
            decision,
            FinalDecision::Rejected { reason: RejectionReason::ExposureCapReached { .. }, .. }
        ));
    }

    #[test]
    fn test_stake_above_headroom_is_modified() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("p1", Side::Yes, dec!(3700), 0.5));
        let decision = manager().evaluate(make_rec(dec!(625)), &portfolio);
        assert!(matches!(decision, FinalDecision::Modified { .. }));
        assert_eq!(decision.final_stake(), dec!(300));
        assert_eq!(decision.recommendation().raw_stake, dec!(625));
    }

    #[test]
    fn test_final_stake_never_breaks_cap() {
        let cap = dec!(0.40);
        for exposure in [0, 1000, 3000, 3999, 4000, 5000] {
            for stake in [1, 250, 625, 1001, 3999] {
                let mut portfolio = PortfolioState::new(dec!(10000));
                if exposure > 0 {
                    let held = make_position("p1", Side::No, Decimal::from(exposure), 0.6);
                    portfolio.positions.push(held);
                }
                let decision = manager().evaluate(make_rec(Decimal::from(stake)), &portfolio);
                assert!(decision.final_stake() + portfolio.exposure() <= cap * portfolio.bankroll
                    || decision.final_stake() == Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_hedge_alert() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("m1", Side::Yes, dec!(500), 0.55));
        let snapshot = make_snapshot("m1", 0.75);
        let snapshots: HashMap<&str, &MarketSnapshot> = HashMap::from([("m1", &snapshot)]);
        let alerts = manager().review_positions(&portfolio, &snapshots);
        assert_eq!(alerts.len(), 1);
        match &alerts[0] {
            PositionAlert::Hedge { hedge_size, .. } => assert_eq!(*hedge_size, dec!(100)),
            other => panic!("expected hedge, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_loss_alert_for_no_position() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        // Held NO at 60%, YES now 0.65 so NO is 35%.
        portfolio.positions.push(make_position("m1", Side::No, dec!(500), 0.40));
        let snapshot = make_snapshot("m1", 0.65);
        let snapshots: HashMap<&str, &MarketSnapshot> = HashMap::from([("m1", &snapshot)]);
        let alerts = manager().review_positions(&portfolio, &snapshots);
        assert_eq!(alerts.len(), 1);
        assert!(matches!(alerts[0], PositionAlert::StopLoss { .. }));
    }

    #[test]
    fn test_stop_loss_needs_more_than_the_drop() {
        // 0.55 - 0.35 computes to 0.20000000000000007: exactly 20 pts.
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("m1", Side::Yes, dec!(500), 0.55));
        portfolio.positions.push(make_position("m2", Side::Yes, dec!(500), 0.56));
        let at_drop = make_snapshot("m1", 0.35);
        let past_drop = make_snapshot("m2", 0.35);
        let snapshots: HashMap<&str, &MarketSnapshot> =
            HashMap::from([("m1", &at_drop), ("m2", &past_drop)]);
        let alerts = manager().review_positions(&portfolio, &snapshots);
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            &alerts[0],
            PositionAlert::StopLoss { market_id, .. } if market_id == "m2"
        ));
    }

    #[test]
    fn test_review_skips_absent_markets() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("gone", Side::Yes, dec!(500), 0.9));
        assert!(manager().review_positions(&portfolio, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_decision_display_is_self_contained() {
        let line = manager()
            .evaluate(make_rec(dec!(625)), &PortfolioState::new(dec!(10000)))
            .to_string();
        assert!(line.starts_with("[ACCEPTED] YES m1"));
        assert!(line.contains("Will the bill pass?"));
        assert!(line.contains("$625.00"));
    }

    #[test]
    fn test_portfolio_summary() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        portfolio.positions.push(make_position("p1", Side::Yes, dec!(1500), 0.5));
        let summary = PortfolioSummary::new(&portfolio, &RiskConfig::default());
        assert_eq!(summary.total_exposure, dec!(1500));
        assert_eq!(summary.available_capital, dec!(2500));
        assert_eq!(summary.open_positions, 1);
    }

    #[test]
    fn test_validate_rejects_zero_positions() {
        let config = RiskConfig { max_open_positions: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
