//! Integration tests driving the public API end to end.

mod backtest;
mod feed;
mod fixtures;
mod pipeline;
mod scripted_feed;
