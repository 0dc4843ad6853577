//! Scripted feed for integration testing.
//!
//! Provides a deterministic `CycleFeed` that hands out queued cycle inputs
//! in order and serves a portfolio the test can change between cycles,
//! all in-memory with no files involved.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use edgewatch::engine::feed::CycleFeed;
use edgewatch::types::{CycleInput, PortfolioState};

pub struct ScriptedFeed {
    cycles: Arc<Mutex<VecDeque<CycleInput>>>,
    portfolio: Arc<Mutex<PortfolioState>>,
    /// If set, every load fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl ScriptedFeed {
    pub fn new(cycles: Vec<CycleInput>, portfolio: PortfolioState) -> Self {
        Self {
            cycles: Arc::new(Mutex::new(cycles.into())),
            portfolio: Arc::new(Mutex::new(portfolio)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_portfolio(&self, portfolio: PortfolioState) {
        *self.portfolio.lock().unwrap() = portfolio;
    }

    pub fn set_error(&self, msg: Option<&str>) {
        *self.force_error.lock().unwrap() = msg.map(String::from);
    }

    pub fn remaining(&self) -> usize {
        self.cycles.lock().unwrap().len()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CycleFeed for ScriptedFeed {
    async fn load_cycle(&self) -> Result<CycleInput> {
        self.check_error()?;
        self.cycles
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no more scripted cycles"))
    }

    async fn load_portfolio(&self) -> Result<PortfolioState> {
        self.check_error()?;
        Ok(self.portfolio.lock().unwrap().clone())
    }
}
