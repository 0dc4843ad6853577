//! File-backed cycle: JSON feed in, JSON-lines decision log out.

use rust_decimal_macros::dec;
use std::path::PathBuf;

use edgewatch::engine::{self, feed::JsonFileFeed};
use edgewatch::storage::{self, LogRecord};
use edgewatch::strategy::{DecisionPipeline, EngineConfig};
use edgewatch::types::*;

use crate::fixtures::*;
use crate::scripted_feed::ScriptedFeed;

fn temp_path(name: &str, ext: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("edgewatch_it_{}_{}.{}", name, uuid::Uuid::new_v4(), ext));
    p
}

#[test]
fn test_json_files_through_cycle_to_log() {
    let input_path = temp_path("cycle", "json");
    let portfolio_path = temp_path("portfolio", "json");
    let log_path = temp_path("decisions", "jsonl");

    let input = make_input(vec![
        with_reference(make_market("m1", 0.45), 0.30),
        make_market("m2", 0.60),
    ]);
    let mut portfolio = PortfolioState::new(dec!(10000));
    portfolio.positions.push(make_position("m2", Side::Yes, dec!(250), 0.30));
    std::fs::write(&input_path, serde_json::to_string_pretty(&input).unwrap()).unwrap();
    std::fs::write(&portfolio_path, serde_json::to_string(&portfolio).unwrap()).unwrap();

    let feed = JsonFileFeed::new(&input_path, &portfolio_path);
    let pipeline = DecisionPipeline::new(&EngineConfig::default()).unwrap();
    let run = tokio_test::block_on(engine::run_cycle(&feed, &pipeline, 1)).unwrap();

    assert_eq!(run.outcome.decisions.len(), 1);
    // m2 moved from 30% to 60% on a YES position: no alert below the hedge line.
    assert!(run.outcome.alerts.is_empty());
    assert_eq!(run.report.portfolio.total_exposure, dec!(250));

    let log = log_path.to_string_lossy().to_string();
    let written = storage::append_cycle(&run.outcome, 1, Some(&log)).unwrap();
    assert_eq!(written, 1);

    let records = storage::load_log(Some(&log)).unwrap();
    match &records[0] {
        LogRecord::Decision { cycle, decision, .. } => {
            assert_eq!(*cycle, 1);
            assert_eq!(decision.market_id(), "m1");
            assert_eq!(decision.label(), run.outcome.decisions[0].label());
            assert_eq!(
                decision.recommendation().opportunity.id,
                run.outcome.decisions[0].recommendation().opportunity.id
            );
        }
        other => panic!("expected decision record, got {other:?}"),
    }

    for p in [&input_path, &portfolio_path, &log_path] {
        std::fs::remove_file(p).ok();
    }
}

#[tokio::test]
async fn test_scripted_feed_over_several_cycles() {
    let feed = ScriptedFeed::new(
        vec![
            make_input(vec![with_reference(make_market("m1", 0.20), 0.40)]),
            make_input(vec![make_market("m1", 0.75)]),
        ],
        PortfolioState::new(dec!(10000)),
    );
    let pipeline = DecisionPipeline::new(&EngineConfig::default()).unwrap();

    let first = engine::run_cycle(&feed, &pipeline, 1).await.unwrap();
    assert_eq!(first.report.stats.accepted, 1);
    let stake = first.outcome.decisions[0].final_stake();

    // The operator acted on the decision before the next cycle.
    let mut portfolio = PortfolioState::new(dec!(10000));
    portfolio.positions.push(make_position("m1", Side::Yes, stake, 0.20));
    feed.set_portfolio(portfolio);

    let second = engine::run_cycle(&feed, &pipeline, 2).await.unwrap();
    assert!(second.outcome.decisions.is_empty());
    assert!(matches!(
        second.outcome.alerts.as_slice(),
        [edgewatch::strategy::risk::PositionAlert::Hedge { .. }]
    ));
    assert_eq!(feed.remaining(), 0);

    let err = engine::run_cycle(&feed, &pipeline, 3).await.unwrap_err();
    assert!(format!("{err:#}").contains("no more scripted cycles"));
}

#[tokio::test]
async fn test_feed_errors_surface() {
    let feed = ScriptedFeed::new(vec![CycleInput::default()], PortfolioState::new(dec!(10000)));
    feed.set_error(Some("social monitor offline"));
    let pipeline = DecisionPipeline::new(&EngineConfig::default()).unwrap();
    let err = engine::run_cycle(&feed, &pipeline, 1).await.unwrap_err();
    assert!(format!("{err:#}").contains("social monitor offline"));

    feed.set_error(None);
    assert!(engine::run_cycle(&feed, &pipeline, 1).await.is_ok());
}
