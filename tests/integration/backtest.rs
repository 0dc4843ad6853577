//! Replaying recorded cycles with known resolutions.

use rust_decimal_macros::dec;

use edgewatch::backtest::{BacktestCycle, Backtester, Resolution};
use edgewatch::detectors::SignalKind;
use edgewatch::strategy::{DecisionPipeline, EngineConfig};
use edgewatch::types::*;

use crate::fixtures::*;

fn make_cycle(markets: Vec<MarketFeed>, resolved: &[(&str, bool)]) -> BacktestCycle {
    BacktestCycle {
        input: make_input(markets),
        resolutions: resolved
            .iter()
            .map(|(id, yes)| Resolution {
                market_id: id.to_string(),
                resolved_yes: *yes,
            })
            .collect(),
    }
}

fn backtester() -> Backtester {
    Backtester::new(DecisionPipeline::new(&EngineConfig::default()).unwrap())
}

#[test]
fn test_mixed_history() {
    let cycles = vec![
        make_cycle(
            vec![
                with_reference(make_market("a", 0.20), 0.40),
                with_reference(make_market("b", 0.45), 0.30),
                make_market("quiet", 0.50),
            ],
            &[],
        ),
        make_cycle(
            vec![make_market("a", 0.25), make_market("b", 0.40)],
            &[("a", true), ("b", true)],
        ),
    ];

    let report = backtester().run(&cycles, dec!(10000));

    assert_eq!(report.cycles, 2);
    assert_eq!(report.decisions, 2);
    assert_eq!(report.total_trades, 2);
    // a was a YES bet that resolved YES, b a NO bet that resolved YES.
    assert_eq!(report.wins, 1);
    assert_eq!(report.losses, 1);
    assert_eq!(report.open_positions, 0);
    assert_eq!(report.final_bankroll, report.initial_bankroll + report.total_pnl);
    assert_eq!(report.by_kind[&SignalKind::ProbabilityDivergence].trades, 2);
    assert!((report.win_rate - 0.5).abs() < 1e-9);
}

#[test]
fn test_same_cycle_decisions_respect_cap_together() {
    // Five strong divergences against a 40% cap: each alone fits, together
    // they cannot all be opened.
    let markets = (0..5)
        .map(|i| with_reference(make_market(&format!("m{i}"), 0.20), 0.60))
        .collect();
    let report = backtester().run(&[make_cycle(markets, &[])], dec!(1000));

    assert_eq!(report.accepted + report.modified, 5);
    assert!(report.open_positions < 5);
}

#[test]
fn test_report_serialises() {
    let cycles = vec![make_cycle(
        vec![with_reference(make_market("a", 0.20), 0.40)],
        &[("a", false)],
    )];
    let report = backtester().run(&cycles, dec!(1000));
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"losses\":1"));
    assert!(report.to_string().contains("1 trades"));
}
