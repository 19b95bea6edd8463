use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub initial_capital: f64,
    pub backtest_days: i64,
    pub backtest_signals: usize,
    pub generator_seed: u64,
    pub events_log_path: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            initial_capital: env::var("INITIAL_CAPITAL")
                .unwrap_or_else(|_| "200.0".to_string())
                .parse()
                .context("Failed to parse INITIAL_CAPITAL")?,
            backtest_days: env::var("BACKTEST_DAYS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Failed to parse BACKTEST_DAYS")?,
            backtest_signals: env::var("BACKTEST_SIGNALS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("Failed to parse BACKTEST_SIGNALS")?,
            generator_seed: env::var("GENERATOR_SEED")
                .unwrap_or_else(|_| "42".to_string())
                .parse()
                .context("Failed to parse GENERATOR_SEED")?,
            events_log_path: env::var("EVENTS_LOG_PATH").ok(),
        })
    }
}
