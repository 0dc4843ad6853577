//! EDGEWATCH: Prediction market edge detection and decision engine
//!
//! Entry point. Loads configuration, initialises structured logging, and
//! either polls the cycle feed on an interval (appending every decision to
//! the decision log) or replays a recorded history in backtest mode.

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{error, info};

use edgewatch::backtest::{BacktestCycle, Backtester};
use edgewatch::config::{AppConfig, DEFAULT_CONFIG_FILE};
use edgewatch::engine::{self, feed::JsonFileFeed};
use edgewatch::storage;
use edgewatch::strategy::DecisionPipeline;

/// Command-line arguments. Anything left unset falls back to the config file.
#[derive(Debug, Parser)]
#[command(name = "edgewatch", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "EDGEWATCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Cycle input JSON written by the data layer.
    #[arg(long)]
    input: Option<String>,

    /// Portfolio JSON maintained by the operator.
    #[arg(long)]
    portfolio: Option<String>,

    /// JSON-lines decision log to append to.
    #[arg(long)]
    decisions: Option<String>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between cycles.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Replay a JSON array of recorded cycles instead of polling.
    #[arg(long, value_name = "FILE")]
    backtest: Option<String>,

    /// Starting bankroll for backtest mode (USD).
    #[arg(long, default_value = "10000")]
    bankroll: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();
    init_logging();

    let mut cfg = AppConfig::load_or_default(&args.config)?;
    if let Some(path) = &args.input {
        cfg.feed.input_path = path.clone();
    }
    if let Some(path) = &args.portfolio {
        cfg.feed.portfolio_path = path.clone();
    }
    if let Some(path) = &args.decisions {
        cfg.feed.decisions_path = path.clone();
    }
    if let Some(secs) = args.interval_secs {
        cfg.feed.poll_interval_secs = secs;
    }
    cfg.validate()?;

    let pipeline = DecisionPipeline::new(&cfg.engine).context("Invalid engine configuration")?;

    if let Some(path) = &args.backtest {
        return run_backtest(pipeline, path, args.bankroll);
    }

    info!(
        input = %cfg.feed.input_path,
        portfolio = %cfg.feed.portfolio_path,
        decisions = %cfg.feed.decisions_path,
        detectors = ?pipeline.detectors().kinds(),
        workers = cfg.engine.workers,
        "EDGEWATCH starting up"
    );

    let feed = JsonFileFeed::new(&cfg.feed.input_path, &cfg.feed.portfolio_path);
    let mut cycle = storage::last_cycle(Some(&cfg.feed.decisions_path))?;
    if cycle > 0 {
        info!(last_cycle = cycle, "Continuing cycle numbering from decision log");
    }

    if args.once {
        return tick(&feed, &pipeline, &cfg, cycle + 1).await;
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.feed.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.feed.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let first = cycle;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle += 1;
                if let Err(e) = tick(&feed, &pipeline, &cfg, cycle).await {
                    error!(cycle, error = format!("{e:#}"), "Cycle failed, continuing to next");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(cycles = cycle - first, "EDGEWATCH shut down cleanly.");
    Ok(())
}

/// Run one cycle, log its report and append the decisions.
async fn tick(
    feed: &JsonFileFeed,
    pipeline: &DecisionPipeline,
    cfg: &AppConfig,
    cycle: u64,
) -> Result<()> {
    let run = engine::run_cycle(feed, pipeline, cycle).await?;
    run.report.log();
    let written = storage::append_cycle(&run.outcome, cycle, Some(&cfg.feed.decisions_path))?;
    info!(cycle, records = written, path = %cfg.feed.decisions_path, "Decision log updated");
    Ok(())
}

fn run_backtest(pipeline: DecisionPipeline, path: &str, bankroll: Decimal) -> Result<()> {
    let cycles: Vec<BacktestCycle> = storage::load_json(path)?;
    info!(path, cycles = cycles.len(), bankroll = format!("${:.2}", bankroll), "Backtest starting");
    let report = Backtester::new(pipeline).run(&cycles, bankroll);
    println!("{report}");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("edgewatch=info"));

    let json_logging = std::env::var("EDGEWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
