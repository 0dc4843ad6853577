//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section and field has a default, so a partial file (or no file at all)
//! yields the documented thresholds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::strategy::EngineConfig;

/// Default config file path, overridable with `EDGEWATCH_CONFIG`.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub feed: FeedConfig,
}

/// Where the file-backed adapters read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// JSON `CycleInput` written by the data layer each cycle.
    pub input_path: String,
    /// JSON `PortfolioState` maintained by the operator.
    pub portfolio_path: String,
    /// JSON-lines decision log.
    pub decisions_path: String,
    pub poll_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            input_path: "data/cycle.json".into(),
            portfolio_path: "data/portfolio.json".into(),
            decisions_path: "data/decisions.jsonl".into(),
            poll_interval_secs: 900,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        anyhow::ensure!(
            self.feed.poll_interval_secs > 0,
            "feed.poll_interval_secs must be positive"
        );
        Ok(())
    }
}
