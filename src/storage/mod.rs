//! Persistence layer.
//!
//! Appends each cycle's decisions and position alerts to a JSON-lines log
//! (one record per line) and loads JSON inputs such as backtest scenarios.
//! The pipeline never reads this log back; the binary only scans it for
//! the last cycle number so numbering continues across restarts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::strategy::risk::{FinalDecision, PositionAlert};
use crate::strategy::CycleOutcome;

/// Default decision log path.
const DEFAULT_DECISIONS_FILE: &str = "edgewatch_decisions.jsonl";

/// One line of the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Decision {
        cycle: u64,
        observed_at: DateTime<Utc>,
        decision: FinalDecision,
    },
    Alert {
        cycle: u64,
        alert: PositionAlert,
    },
}

/// Append a cycle's decisions and alerts. Returns the number of records
/// written.
pub fn append_cycle(outcome: &CycleOutcome, cycle: u64, path: Option<&str>) -> Result<usize> {
    let path = path.unwrap_or(DEFAULT_DECISIONS_FILE);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open decision log {path}"))?;

    let records = outcome
        .decisions
        .iter()
        .map(|d| LogRecord::Decision {
            cycle,
            observed_at: d.recommendation().opportunity.observed_at,
            decision: d.clone(),
        })
        .chain(outcome.alerts.iter().map(|a| LogRecord::Alert {
            cycle,
            alert: a.clone(),
        }));

    let mut written = 0;
    for record in records {
        let line = serde_json::to_string(&record).context("Failed to serialise log record")?;
        writeln!(file, "{line}").with_context(|| format!("Failed to write to {path}"))?;
        written += 1;
    }

    debug!(path, cycle, records = written, "Decisions appended");
    Ok(written)
}

/// Read every record from a decision log. A missing file is an empty log.
pub fn load_log(path: Option<&str>) -> Result<Vec<LogRecord>> {
    let path = path.unwrap_or(DEFAULT_DECISIONS_FILE);
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read decision log {path}"))?;
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Failed to parse line {} of {path}", i + 1))
        })
        .collect()
}

/// Highest cycle number recorded in the log, or 0 for an empty log.
pub fn last_cycle(path: Option<&str>) -> Result<u64> {
    let last = load_log(path)?
        .iter()
        .map(|r| match r {
            LogRecord::Decision { cycle, .. } | LogRecord::Alert { cycle, .. } => *cycle,
        })
        .max()
        .unwrap_or(0);
    Ok(last)
}

/// Load any JSON document.
pub fn load_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {path}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
