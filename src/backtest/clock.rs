use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::position::{EquitySample, ExitReason, Position};
use crate::models::signal::{Signal, TokenId};
use crate::trading::account::Account;

/// One observation on a token's price path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub positions: Vec<Position>,
    pub equity_curve: Vec<EquitySample>,
    pub final_capital: f64,
}

fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp() - ts.timestamp().rem_euclid(60);
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(ts)
}

/// Drives an Account across discretized time: one pass from the earliest
/// to the latest sample at fixed 1-minute granularity, admitting signals
/// and advancing positions as the clock crosses them. Strictly
/// single-threaded; identical inputs reproduce identical output.
#[derive(Debug, Clone)]
pub struct BacktestClock {
    step: Duration,
    /// Skip ahead to the next signal while flat. Equity is constant and no
    /// exit can fire with nothing open, so the skipped samples carry no
    /// information.
    flat_jump: bool,
}

impl Default for BacktestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BacktestClock {
    pub fn new() -> Self {
        Self {
            step: Duration::minutes(1),
            flat_jump: true,
        }
    }

    pub fn without_flat_jump(mut self) -> Self {
        self.flat_jump = false;
        self
    }

    pub fn run(
        &self,
        account: &mut Account,
        mut signals: Vec<Signal>,
        price_paths: HashMap<TokenId, Vec<PriceSample>>,
    ) -> Result<BacktestResult, EngineError> {
        // Stable sort: ties keep arrival order
        signals.sort_by_key(|s| s.observed_at);

        let mut paths: HashMap<TokenId, Vec<PriceSample>> = HashMap::new();
        for (token, mut samples) in price_paths {
            samples.sort_by_key(|s| s.timestamp);
            for s in samples.iter_mut() {
                s.timestamp = floor_to_minute(s.timestamp);
            }
            if samples.iter().any(|s| !s.value.is_finite() || s.value <= 0.0) {
                return Err(EngineError::BacktestError(format!(
                    "non-positive sample in price path for {}",
                    token
                )));
            }
            paths.insert(token, samples);
        }

        let min_time = paths.values().filter_map(|p| p.first()).map(|s| s.timestamp).min();
        let max_time = paths.values().filter_map(|p| p.last()).map(|s| s.timestamp).max();
        let (min_time, max_time) = match (min_time, max_time) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => {
                warn!("No price data supplied, nothing to backtest");
                return Ok(BacktestResult {
                    positions: Vec::new(),
                    equity_curve: Vec::new(),
                    final_capital: account.cash(),
                });
            }
        };

        info!(
            "Running backtest from {} to {} with {} signals over {} paths",
            min_time,
            max_time,
            signals.len(),
            paths.len()
        );

        let mut cursors: HashMap<TokenId, usize> = HashMap::new();
        let mut equity_curve = Vec::new();
        let mut sig_idx = 0;
        let mut current = min_time;

        while current <= max_time {
            account.roll_day(current);

            // Advance every open position that has a sample at this step.
            // A missing sample is a data gap: skip the tick. An exhausted
            // feed closes the position at its last known value.
            let open_tokens: Vec<TokenId> = {
                let mut tokens: Vec<TokenId> = Vec::new();
                for pos in account.active_positions() {
                    if !tokens.contains(&pos.token_id) {
                        tokens.push(pos.token_id.clone());
                    }
                }
                tokens
            };
            for token in open_tokens {
                let samples = match paths.get(&token) {
                    Some(s) => s,
                    None => continue,
                };
                let cursor = cursors.entry(token.clone()).or_insert(0);
                while *cursor < samples.len() && samples[*cursor].timestamp < current {
                    *cursor += 1;
                }
                if *cursor < samples.len() {
                    let sample = samples[*cursor];
                    if sample.timestamp == current {
                        account.advance(&token, sample.value, current);
                    }
                } else if let Some(last) = samples.last() {
                    debug!("Feed exhausted for {}, closing at last value", token);
                    account.close_at(&token, last.value, current, ExitReason::EndOfData);
                }
            }

            // Admit everything observed up to this step, in timestamp order
            while sig_idx < signals.len() && signals[sig_idx].observed_at <= current {
                account.process_signal(&signals[sig_idx]);
                sig_idx += 1;
            }

            equity_curve.push(account.sample_equity(current));

            current = current + self.step;
            if self.flat_jump
                && account.active_positions().is_empty()
                && sig_idx < signals.len()
            {
                let jump_to = floor_to_minute(signals[sig_idx].observed_at) - self.step;
                if jump_to > current {
                    current = jump_to;
                }
            }
        }

        let mut positions = account.closed_positions().to_vec();
        positions.extend(account.active_positions().iter().cloned());

        Ok(BacktestResult {
            positions,
            equity_curve,
            final_capital: account.cash(),
        })
    }
}
