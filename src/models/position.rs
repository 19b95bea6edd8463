use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::{Signal, TokenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TimeExit,
    EndOfData,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "Stop Loss"),
            Self::TimeExit => write!(f, "Time Exit (stagnant)"),
            Self::EndOfData => write!(f, "End Of Data"),
            Self::Manual => write!(f, "Manual Close"),
        }
    }
}

/// One simulated trade. Units are denominated in the signal's reference
/// metric (price or market-cap proxy), so `remaining_units * last_value`
/// is the mark-to-market value in quote currency.
///
/// Mutated exclusively by the Account that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub token_id: TokenId,
    pub symbol: String,
    pub strategy: String,

    // Entry
    pub entry_time: DateTime<Utc>,
    pub entry_value: f64,
    pub initial_size: f64, // quote currency spent
    pub initial_units: f64,

    // Live state
    pub remaining_units: f64,
    pub peak_value: f64,  // never decreases
    pub stop_level: f64,  // never decreases while open
    pub hit_tiers: Vec<usize>,
    pub realized_pnl: f64,
    pub last_value: f64,

    // Exit
    pub status: PositionStatus,
    pub exit_reason: Option<ExitReason>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn open(signal: &Signal, strategy: &str, size: f64, stop_fraction: f64) -> Self {
        let entry_value = signal.reference_value;
        let initial_units = size / entry_value;
        Self {
            id: Uuid::new_v4().to_string(),
            token_id: signal.token_id.clone(),
            symbol: signal.symbol.clone(),
            strategy: strategy.to_string(),
            entry_time: signal.observed_at,
            entry_value,
            initial_size: size,
            initial_units,
            remaining_units: initial_units,
            peak_value: entry_value,
            stop_level: entry_value * (1.0 - stop_fraction),
            hit_tiers: Vec::new(),
            realized_pnl: 0.0,
            last_value: entry_value,
            status: PositionStatus::Open,
            exit_reason: None,
            exit_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Fractional return against entry.
    pub fn roi(&self, current_value: f64) -> f64 {
        (current_value - self.entry_value) / self.entry_value
    }

    /// Record a fresh observation, ratcheting the peak.
    pub fn note_value(&mut self, value: f64) {
        self.last_value = value;
        if value > self.peak_value {
            self.peak_value = value;
        }
    }

    /// Raise the stop floor. Lower levels are ignored, so the stop is
    /// monotonic over the position's lifetime.
    pub fn raise_stop(&mut self, level: f64) {
        if level > self.stop_level {
            self.stop_level = level;
        }
    }

    /// Value of the remaining units at the last observed value.
    pub fn mark_to_market(&self) -> f64 {
        self.remaining_units * self.last_value
    }

    /// Sell `units` at `value` per unit, booking realized PnL against the
    /// entry cost basis. Returns the proceeds.
    pub fn sell_units(&mut self, units: f64, value: f64) -> f64 {
        let units = units.min(self.remaining_units);
        let proceeds = units * value;
        let cost_basis = units * self.entry_value;
        self.realized_pnl += proceeds - cost_basis;
        self.remaining_units -= units;
        proceeds
    }

    /// Liquidate everything that is left and mark the position closed.
    /// Returns the proceeds of the final sale.
    pub fn close(&mut self, value: f64, reason: ExitReason, now: DateTime<Utc>) -> f64 {
        let proceeds = self.sell_units(self.remaining_units, value);
        self.remaining_units = 0.0;
        self.last_value = value;
        self.status = PositionStatus::Closed;
        self.exit_reason = Some(reason);
        self.exit_time = Some(now);
        proceeds
    }

    pub fn holding_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.entry_time).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeEventKind {
    Open,
    PartialClose,
    Close,
}

/// Emitted by the Account on every position state change. Consumed
/// best-effort by alerting/persistence sinks; a snapshot is embedded so
/// consumers never reach back into live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeEventKind,
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub fraction_sold: Option<f64>,
    pub reason: Option<String>,
}

/// One point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySample {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub equity: f64,
}
