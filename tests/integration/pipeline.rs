//! Full-pipeline behaviour over realistic cycle inputs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use edgewatch::detectors::{SignalKind, SignalPayload};
use edgewatch::strategy::risk::{FinalDecision, PositionAlert, RejectionReason};
use edgewatch::strategy::{DecisionPipeline, EngineConfig};
use edgewatch::types::*;

use crate::fixtures::*;

fn pipeline() -> DecisionPipeline {
    DecisionPipeline::new(&EngineConfig::default()).unwrap()
}

/// A cycle that exercises every detector at once.
fn busy_cycle() -> CycleInput {
    let mut wallet_market = with_reference(make_market("wallet", 0.30), 0.45);
    wallet_market.wallet_activity = Some(vec![fresh_wallet("wallet", Side::Yes, 8_000.0)]);

    let mut social = with_volume(make_market("social", 0.62), 45_000.0);
    social.mentions = Some(SocialMentions {
        keywords: vec!["launch".into()],
        count: 40,
        window_hours: 1.0,
    });

    make_input(vec![
        with_reference(make_market("diverged", 0.45), 0.30),
        wallet_market,
        social,
        with_history(make_market("lead", 0.50), &[0.30, 0.32, 0.35, 0.33, 0.38, 0.40], 0.40),
        with_history(make_market("lag", 0.30), &[0.20, 0.22, 0.25, 0.23, 0.28, 0.30], 0.30),
        make_market("quiet", 0.35),
    ])
}

#[test]
fn test_no_signal_no_opportunity() {
    let input = make_input(vec![
        make_market("a", 0.20),
        make_market("b", 0.70),
        with_reference(make_market("c", 0.40), 0.45),
    ]);
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.stats.no_signals, 3);
}

#[test]
fn test_fifteen_point_divergence_bets_no() {
    let input = make_input(vec![with_reference(make_market("m1", 0.45), 0.30)]);
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));

    assert_eq!(outcome.decisions.len(), 1);
    let opp = &outcome.decisions[0].recommendation().opportunity;
    assert_eq!(opp.side, Side::No);
    assert_eq!(opp.signals.len(), 1);
    assert!((opp.signals[0].strength - 0.15).abs() < 1e-9);
    assert!((opp.edge + 0.15).abs() < 1e-9);
    assert!(matches!(outcome.decisions[0], FinalDecision::Accepted(_)));
}

#[test]
fn test_volume_spike_ratio_and_direction() {
    // Baseline averages 10,000 per 4h; the window saw 42,000.
    let mut feed = with_volume(make_market("m1", 0.30), 42_000.0);
    feed.snapshot.probability_history.push(ProbabilityPoint {
        at: t0() - chrono::Duration::hours(5),
        probability: 0.26,
    });
    let input = make_input(vec![feed]);

    let config = EngineConfig::default();
    let detectors = edgewatch::detectors::DetectorSet::from_config(&config.detectors);
    let peers = std::collections::HashMap::new();
    let ctx = edgewatch::detectors::MarketContext::from_feed(&input.markets[0], &[], &peers);
    let signals = detectors.detect(&ctx);

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind(), SignalKind::VolumeSpike);
    assert!((signals[0].strength - 4.2).abs() < 1e-9);
    match &signals[0].payload {
        SignalPayload::VolumeSpike(v) => assert!((v.window_move - 0.04).abs() < 1e-9),
        other => panic!("expected volume payload, got {other:?}"),
    }
}

#[test]
fn test_coin_flip_needs_thesis() {
    let bare = make_input(vec![with_volume(make_market("flip", 0.50), 60_000.0)]);
    let outcome = pipeline().run_cycle(&bare, &PortfolioState::new(dec!(10000)));
    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.stats.filtered, 1);

    let with_thesis = make_input(vec![with_reference(
        with_volume(make_market("flip", 0.50), 60_000.0),
        0.35,
    )]);
    let outcome = pipeline().run_cycle(&with_thesis, &PortfolioState::new(dec!(10000)));
    assert_eq!(outcome.decisions.len(), 1);
    let kinds: Vec<SignalKind> = outcome.decisions[0]
        .recommendation()
        .opportunity
        .signals
        .iter()
        .map(|s| s.kind())
        .collect();
    assert_eq!(kinds, vec![SignalKind::VolumeSpike, SignalKind::ProbabilityDivergence]);
}

#[test]
fn test_position_cap_rejects_any_edge() {
    let mut portfolio = PortfolioState::new(dec!(100000));
    for i in 0..10 {
        portfolio
            .positions
            .push(make_position(&format!("held-{i}"), Side::Yes, dec!(100), 0.5));
    }
    let input = make_input(vec![with_reference(make_market("huge", 0.20), 0.80)]);
    let outcome = pipeline().run_cycle(&input, &portfolio);

    assert_eq!(outcome.decisions.len(), 1);
    match &outcome.decisions[0] {
        FinalDecision::Rejected { reason, .. } => {
            assert_eq!(*reason, RejectionReason::MaxPositionsReached { open: 10, max: 10 })
        }
        other => panic!("expected rejection, got {other}"),
    }
}

#[test]
fn test_exposure_never_exceeds_cap() {
    let pipeline = pipeline();
    let cap = dec!(0.40);
    for bankroll in [dec!(1000), dec!(10000), dec!(25000)] {
        for used in [dec!(0), dec!(0.10), dec!(0.30), dec!(0.39), dec!(0.40), dec!(0.45)] {
            for reference in [0.33, 0.45, 0.60, 0.90] {
                let mut portfolio = PortfolioState::new(bankroll);
                if used > Decimal::ZERO {
                    portfolio
                        .positions
                        .push(make_position("elsewhere", Side::Yes, bankroll * used, 0.5));
                }
                let input = make_input(vec![with_reference(make_market("m", 0.20), reference)]);
                let outcome = pipeline.run_cycle(&input, &portfolio);

                for decision in &outcome.decisions {
                    if decision.is_actionable() {
                        assert!(
                            decision.final_stake() + portfolio.exposure() <= cap * bankroll,
                            "bankroll {bankroll} used {used} ref {reference}: {decision}"
                        );
                    }
                    assert!(decision.final_stake() >= Decimal::ZERO);
                }
            }
        }
    }
}

#[test]
fn test_fresh_wallet_joins_divergence() {
    let input = busy_cycle();
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));

    let decision = outcome
        .decisions
        .iter()
        .find(|d| d.market_id() == "wallet")
        .expect("wallet market should produce a decision");
    let opp = &decision.recommendation().opportunity;
    let kinds: Vec<SignalKind> = opp.signals.iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, vec![SignalKind::ProbabilityDivergence, SignalKind::Wallet]);
    // 0.15 measured gap plus the fresh-wallet nudge.
    assert!((opp.fair_probability - 0.48).abs() < 1e-9);
}

#[test]
fn test_laggard_found_without_precomputed_pairs() {
    let input = busy_cycle();
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));

    let lag = outcome
        .decisions
        .iter()
        .find(|d| d.market_id() == "lag")
        .expect("laggard should produce a decision");
    let opp = &lag.recommendation().opportunity;
    assert_eq!(opp.side, Side::Yes);
    assert_eq!(opp.signals[0].kind(), SignalKind::CorrelationDivergence);

    // The leader carries no measured gap of its own.
    assert!(outcome.decisions.iter().all(|d| d.market_id() != "lead"));
}

#[test]
fn test_pipeline_is_idempotent() {
    let input = busy_cycle();
    let mut portfolio = PortfolioState::new(dec!(10000));
    portfolio.positions.push(make_position("diverged", Side::No, dec!(500), 0.60));

    let first = pipeline().run_cycle(&input, &portfolio);
    let second = pipeline().run_cycle(&input, &portfolio);
    let parallel = DecisionPipeline::new(&EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    })
    .unwrap()
    .run_cycle(&input, &portfolio);

    let a = serde_json::to_string(&first.decisions).unwrap();
    let b = serde_json::to_string(&second.decisions).unwrap();
    let c = serde_json::to_string(&parallel.decisions).unwrap();
    assert!(!first.decisions.is_empty());
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(first.alerts, parallel.alerts);
}

#[test]
fn test_bad_market_is_isolated() {
    let input = make_input(vec![
        make_market("broken", 1.5),
        with_reference(make_market("fine", 0.45), 0.30),
    ]);
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));
    assert_eq!(outcome.stats.invalid, 1);
    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.decisions[0].market_id(), "fine");
}

#[test]
fn test_invalid_configuration_fails_up_front() {
    let mut config = EngineConfig::default();
    config.detectors.volume.multiplier = -1.0;
    match DecisionPipeline::new(&config) {
        Err(EngineError::InvalidConfiguration { field, .. }) => {
            assert_eq!(field, "volume.multiplier")
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("negative multiplier accepted"),
    }
}

#[test]
fn test_out_of_range_windows_fail_up_front() {
    let mut config = EngineConfig::default();
    config.detectors.volume.window_hours = 1e12;
    match DecisionPipeline::new(&config) {
        Err(EngineError::InvalidConfiguration { field, .. }) => {
            assert_eq!(field, "volume.window_hours")
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("unbounded window accepted"),
    }

    let mut config = EngineConfig::default();
    config.detectors.correlation.window_days = i64::MAX;
    match DecisionPipeline::new(&config) {
        Err(EngineError::InvalidConfiguration { field, .. }) => {
            assert_eq!(field, "correlation.window_days")
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("unbounded window accepted"),
    }
}

#[test]
fn test_twelve_point_divergence_is_inclusive() {
    let input = make_input(vec![
        with_reference(make_market("low", 0.35), 0.23),
        with_reference(make_market("high", 0.57), 0.45),
    ]);
    let outcome = pipeline().run_cycle(&input, &PortfolioState::new(dec!(10000)));
    assert_eq!(outcome.stats.no_signals, 0);
    assert_eq!(outcome.decisions.len(), 2);
    assert_eq!(outcome.stats.signals, 2);
}

#[test]
fn test_hedge_and_stop_loss_alerts() {
    let mut portfolio = PortfolioState::new(dec!(10000));
    portfolio.positions.push(make_position("winning", Side::Yes, dec!(400), 0.50));
    portfolio.positions.push(make_position("losing", Side::No, dec!(300), 0.40));

    let input = make_input(vec![make_market("winning", 0.75), make_market("losing", 0.75)]);
    let outcome = pipeline().run_cycle(&input, &portfolio);

    assert_eq!(outcome.alerts.len(), 2);
    match &outcome.alerts[0] {
        PositionAlert::Hedge { market_id, hedge_size, .. } => {
            assert_eq!(market_id, "winning");
            assert_eq!(*hedge_size, dec!(80.00));
        }
        other => panic!("expected hedge, got {other}"),
    }
    // NO held at 60% now 25%.
    assert!(matches!(
        &outcome.alerts[1],
        PositionAlert::StopLoss { market_id, .. } if market_id == "losing"
    ));
}
