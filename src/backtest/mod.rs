//! Offline replay of recorded cycles against known resolutions.

pub mod runner;

pub use runner::{BacktestCycle, BacktestReport, BacktestTrade, Backtester, Resolution};
