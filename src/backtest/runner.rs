//! Historical backtesting engine.
//!
//! Replays recorded cycles through the `DecisionPipeline`, acting as the
//! operator would: actionable decisions open positions, stop-loss alerts
//! close them at the current price, and recorded resolutions settle them.
//! Reports win rate, P&L, Sharpe ratio, max drawdown, Brier score of the
//! implied fair probabilities, and per-signal-kind attribution.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::detectors::SignalKind;
use crate::strategy::risk::{FinalDecision, PositionAlert};
use crate::strategy::DecisionPipeline;
use crate::types::{usd, CycleInput, OpenPosition, PortfolioState, Side};

// ---------------------------------------------------------------------------
// Historical data
// ---------------------------------------------------------------------------

/// A market that resolved at the end of a recorded cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub market_id: String,
    pub resolved_yes: bool,
}

/// One recorded cycle plus the resolutions known after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestCycle {
    pub input: CycleInput,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradeExit {
    Resolved { won: bool },
    StoppedOut { exit_price: f64 },
}

/// Individual closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub market_id: String,
    pub side: Side,
    pub stake: Decimal,
    /// Price paid per share of the held side.
    pub entry_price: f64,
    /// Implied fair probability of YES when the trade was opened.
    pub fair_probability: f64,
    pub signal_kinds: Vec<SignalKind>,
    pub opened_cycle: usize,
    pub closed_cycle: usize,
    pub exit: TradeExit,
    pub pnl: Decimal,
    pub bankroll_after: Decimal,
}

/// Attribution for one signal kind across closed trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub trades: usize,
    pub wins: usize,
    pub pnl: Decimal,
}

/// Complete backtest performance report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub cycles: usize,
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_pnl: Decimal,
    pub return_pct: f64,
    pub decisions: usize,
    pub accepted: usize,
    pub modified: usize,
    pub rejected: usize,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub stopped_out: usize,
    /// Positions still open after the last cycle.
    pub open_positions: usize,
    pub hedge_alerts: usize,
    pub win_rate: f64,
    pub brier_score: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub peak_bankroll: Decimal,
    pub by_kind: BTreeMap<SignalKind, KindStats>,
    pub trade_log: Vec<BacktestTrade>,
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cycles | {} decisions ({} accepted, {} modified, {} rejected)",
            self.cycles, self.decisions, self.accepted, self.modified, self.rejected
        )?;
        writeln!(
            f,
            "{} trades: {} won, {} lost, {} stopped out, {} still open | win rate {:.1}%",
            self.total_trades,
            self.wins,
            self.losses,
            self.stopped_out,
            self.open_positions,
            self.win_rate * 100.0
        )?;
        writeln!(
            f,
            "bankroll ${:.2} -> ${:.2} | P&L ${:.2} ({:+.1}%)",
            self.initial_bankroll, self.final_bankroll, self.total_pnl, self.return_pct
        )?;
        writeln!(
            f,
            "max drawdown ${:.2} ({:.1}%) | Sharpe {:.2} | Brier {:.3}",
            self.max_drawdown, self.max_drawdown_pct, self.sharpe_ratio, self.brier_score
        )?;
        for (kind, stats) in &self.by_kind {
            writeln!(
                f,
                "  {:<24} {:>3} trades, {:>3} wins, P&L ${:.2}",
                kind, stats.trades, stats.wins, stats.pnl
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

struct OpenTrade {
    position: OpenPosition,
    fair_probability: f64,
    signal_kinds: Vec<SignalKind>,
    opened_cycle: usize,
}

impl OpenTrade {
    fn entry_price(&self) -> f64 {
        self.position.entry_held_probability()
    }
}

#[derive(Default)]
struct Tally {
    trades: Vec<BacktestTrade>,
    returns: Vec<f64>,
    brier_sum: f64,
    peak: Decimal,
    /// Worst fall from the running peak, as a fraction of that peak.
    max_dd: f64,
    /// Worst fall from the running peak, in USD.
    max_dd_usd: Decimal,
}

pub struct Backtester {
    pipeline: DecisionPipeline,
}

impl Backtester {
    pub fn new(pipeline: DecisionPipeline) -> Self {
        Self { pipeline }
    }

    /// Run a backtest over recorded cycles in chronological order.
    pub fn run(&self, cycles: &[BacktestCycle], initial_bankroll: Decimal) -> BacktestReport {
        let mut bankroll = initial_bankroll;
        let mut open: Vec<OpenTrade> = Vec::new();
        let mut tally = Tally {
            peak: initial_bankroll,
            ..Default::default()
        };
        let (mut decisions, mut accepted, mut modified, mut rejected) = (0, 0, 0, 0);
        let mut hedge_alerts = 0;

        for (c, cycle) in cycles.iter().enumerate() {
            let portfolio = portfolio_of(bankroll, &open);
            let outcome = self.pipeline.run_cycle(&cycle.input, &portfolio);

            // Stop-losses close at the current held-side price.
            for alert in &outcome.alerts {
                match alert {
                    PositionAlert::StopLoss {
                        market_id,
                        side,
                        entry_probability,
                        held_probability,
                        ..
                    } => {
                        let Some(i) = open.iter().position(|t| {
                            t.position.market_id == *market_id
                                && t.position.side == *side
                                && t.entry_price() == *entry_probability
                        }) else {
                            continue;
                        };
                        let trade = open.remove(i);
                        let exit_price = *held_probability;
                        let ratio = if trade.entry_price() > 0.0 {
                            exit_price / trade.entry_price()
                        } else {
                            0.0
                        };
                        let stake = trade.position.stake.to_f64().unwrap_or(0.0);
                        let pnl = usd(stake * (ratio - 1.0));
                        bankroll += pnl;
                        debug!(market_id = %market_id, pnl = format!("${:.2}", pnl), "Stopped out");
                        let exit = TradeExit::StoppedOut { exit_price };
                        close(&mut tally, trade, c, exit, pnl, bankroll, None);
                    }
                    PositionAlert::Hedge { .. } => hedge_alerts += 1,
                }
            }

            // Act on decisions in order, re-checking limits as positions open.
            for decision in &outcome.decisions {
                decisions += 1;
                match decision {
                    FinalDecision::Accepted(_) => accepted += 1,
                    FinalDecision::Modified { .. } => modified += 1,
                    FinalDecision::Rejected { .. } => rejected += 1,
                }
                if !decision.is_actionable() {
                    continue;
                }
                let current = portfolio_of(bankroll, &open);
                let recheck = self
                    .pipeline
                    .risk()
                    .evaluate(decision.recommendation().clone(), &current);
                let stake = recheck.final_stake();
                if stake <= Decimal::ZERO {
                    debug!(
                        market_id = %decision.market_id(),
                        "Skipped: limits reached earlier this cycle"
                    );
                    continue;
                }
                let opp = &decision.recommendation().opportunity;
                open.push(OpenTrade {
                    position: OpenPosition {
                        market_id: opp.market_id.clone(),
                        side: opp.side,
                        stake,
                        entry_probability: opp.market_probability,
                        correlated_market_id: None,
                    },
                    fair_probability: opp.fair_probability,
                    signal_kinds: opp.signals.iter().map(|s| s.kind()).collect(),
                    opened_cycle: c,
                });
            }

            // Settle resolved markets.
            for resolution in &cycle.resolutions {
                let mut i = 0;
                while i < open.len() {
                    if open[i].position.market_id != resolution.market_id {
                        i += 1;
                        continue;
                    }
                    let trade = open.remove(i);
                    let won = match trade.position.side {
                        Side::Yes => resolution.resolved_yes,
                        Side::No => !resolution.resolved_yes,
                    };
                    let price = trade.entry_price();
                    let pnl = if won && price > 0.0 {
                        let payout_ratio = (1.0 - price) / price;
                        usd(trade.position.stake.to_f64().unwrap_or(0.0) * payout_ratio)
                    } else if won {
                        Decimal::ZERO
                    } else {
                        -trade.position.stake
                    };
                    bankroll += pnl;
                    let exit = TradeExit::Resolved { won };
                    let resolved_yes = Some(resolution.resolved_yes);
                    close(&mut tally, trade, c, exit, pnl, bankroll, resolved_yes);
                }
            }
        }

        let trades = tally.trades.len();
        let count = |won: bool| {
            tally
                .trades
                .iter()
                .filter(|t| t.exit == TradeExit::Resolved { won })
                .count()
        };
        let (wins, losses) = (count(true), count(false));
        let stopped_out = trades - wins - losses;
        let resolved = wins + losses;

        let mut by_kind: BTreeMap<SignalKind, KindStats> = BTreeMap::new();
        for trade in &tally.trades {
            let mut kinds = trade.signal_kinds.clone();
            kinds.dedup();
            for kind in kinds {
                let entry = by_kind.entry(kind).or_default();
                entry.trades += 1;
                if matches!(trade.exit, TradeExit::Resolved { won: true }) {
                    entry.wins += 1;
                }
                entry.pnl += trade.pnl;
            }
        }

        let return_pct = if initial_bankroll > Decimal::ZERO {
            ((bankroll - initial_bankroll) / initial_bankroll * dec!(100)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        let report = BacktestReport {
            cycles: cycles.len(),
            initial_bankroll,
            final_bankroll: bankroll,
            total_pnl: bankroll - initial_bankroll,
            return_pct,
            decisions,
            accepted,
            modified,
            rejected,
            total_trades: trades,
            wins,
            losses,
            stopped_out,
            open_positions: open.len(),
            hedge_alerts,
            win_rate: if resolved > 0 { wins as f64 / resolved as f64 } else { 0.0 },
            brier_score: if resolved > 0 { tally.brier_sum / resolved as f64 } else { 0.0 },
            sharpe_ratio: sharpe_ratio(&tally.returns),
            max_drawdown: tally.max_dd_usd,
            max_drawdown_pct: tally.max_dd * 100.0,
            peak_bankroll: tally.peak,
            by_kind,
            trade_log: tally.trades,
        };

        info!(
            cycles = report.cycles,
            trades = report.total_trades,
            pnl = format!("${:.2}", report.total_pnl),
            drawdown = format!("{:.1}%", report.max_drawdown_pct),
            "Backtest complete"
        );

        report
    }
}

fn portfolio_of(bankroll: Decimal, open: &[OpenTrade]) -> PortfolioState {
    PortfolioState {
        bankroll,
        positions: open.iter().map(|t| t.position.clone()).collect(),
    }
}

fn close(
    tally: &mut Tally,
    trade: OpenTrade,
    cycle: usize,
    exit: TradeExit,
    pnl: Decimal,
    bankroll: Decimal,
    resolved_yes: Option<bool>,
) {
    if let Some(yes) = resolved_yes {
        let outcome = if yes { 1.0 } else { 0.0 };
        tally.brier_sum += (trade.fair_probability - outcome).powi(2);
    }

    let stake = trade.position.stake.to_f64().unwrap_or(0.0).max(0.01);
    tally.returns.push(pnl.to_f64().unwrap_or(0.0) / stake);

    if bankroll > tally.peak {
        tally.peak = bankroll;
    }
    tally.max_dd_usd = tally.max_dd_usd.max(tally.peak - bankroll);
    if tally.peak > Decimal::ZERO {
        let dd = (Decimal::ONE - bankroll / tally.peak).to_f64().unwrap_or(0.0);
        tally.max_dd = tally.max_dd.max(dd);
    }

    tally.trades.push(BacktestTrade {
        market_id: trade.position.market_id.clone(),
        side: trade.position.side,
        stake: trade.position.stake,
        entry_price: trade.entry_price(),
        fair_probability: trade.fair_probability,
        signal_kinds: trade.signal_kinds,
        opened_cycle: trade.opened_cycle,
        closed_cycle: cycle,
        exit,
        pnl,
        bankroll_after: bankroll,
    });
}

/// Per-trade Sharpe ratio (mean return over its sample standard deviation).
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev < 1e-10 {
        return 0.0;
    }
    mean / std_dev
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
