use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Why a signal was turned away. A normal negative result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    ScoreBelowMinimum { score: f64, min: f64 },
    MaxConcurrent { cap: usize },
    LossBreakerTripped,
    NoCapital,
    ZeroSize,
    InvalidReference(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScoreBelowMinimum { score, min } => {
                write!(f, "score {:.1} below minimum {:.1}", score, min)
            }
            Self::MaxConcurrent { cap } => write!(f, "max concurrent positions ({}) reached", cap),
            Self::LossBreakerTripped => write!(f, "daily loss breaker tripped"),
            Self::NoCapital => write!(f, "no capital available"),
            Self::ZeroSize => write!(f, "computed size is zero"),
            Self::InvalidReference(msg) => write!(f, "invalid reference value: {}", msg),
        }
    }
}

/// Tracks the daily loss circuit breaker and the admission caps.
/// Day rollover re-arms the breaker and re-bases the drawdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBudget {
    max_concurrent: usize,
    max_daily_loss_fraction: f64,
    daily_start_equity: f64,
    current_day: Option<NaiveDate>,
    tripped: bool,
}

impl RiskBudget {
    pub fn new(max_concurrent: usize, max_daily_loss_fraction: f64, initial_equity: f64) -> Self {
        Self {
            max_concurrent,
            max_daily_loss_fraction,
            daily_start_equity: initial_equity,
            current_day: None,
            tripped: false,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn daily_start_equity(&self) -> f64 {
        self.daily_start_equity
    }

    /// Re-base on a new trading day. Idempotent within a day.
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>, equity: f64) -> bool {
        let today = now.date_naive();
        if self.current_day == Some(today) {
            return false;
        }
        self.current_day = Some(today);
        self.daily_start_equity = equity;
        if self.tripped {
            info!("Daily loss breaker re-armed for {}", today);
        }
        self.tripped = false;
        true
    }

    /// Feed the latest equity; trips the breaker on excessive drawdown.
    pub fn record_equity(&mut self, equity: f64) {
        if self.tripped {
            return;
        }
        let day_pnl = equity - self.daily_start_equity;
        if day_pnl < -(self.daily_start_equity * self.max_daily_loss_fraction) {
            warn!(
                "Daily loss breaker TRIPPED: equity {:.2} down from {:.2}",
                equity, self.daily_start_equity
            );
            self.tripped = true;
        }
    }

    /// Capacity/capital/breaker gate. Sizing happens after this passes.
    pub fn admits(&self, active_count: usize, cash: f64) -> Result<(), RejectReason> {
        if self.tripped {
            return Err(RejectReason::LossBreakerTripped);
        }
        if active_count >= self.max_concurrent {
            return Err(RejectReason::MaxConcurrent {
                cap: self.max_concurrent,
            });
        }
        if cash <= 0.0 {
            return Err(RejectReason::NoCapital);
        }
        Ok(())
    }
}
