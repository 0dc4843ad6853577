//! EDGEWATCH: Prediction market edge detection and decision engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod detectors;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod backtest;
