use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::position::{
    EquitySample, ExitReason, Position, TradeEvent, TradeEventKind,
};
use crate::models::signal::{PriceUpdate, Signal, TokenId};
use crate::trading::events::{publish_all, TradeEventSink};
use crate::trading::exit::ExitStateMachine;
use crate::trading::risk::{RejectReason, RiskBudget};
use crate::trading::strategy::StrategyProfile;

/// What `process_signal` did with a signal.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    Opened(Position),
    Rejected(RejectReason),
}

impl SignalOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened(_))
    }
}

/// Read-only aggregate over the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStats {
    pub balance: f64,
    pub equity: f64,
    pub roi_percent: f64,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
}

/// One simulated trading account for one strategy variant: admission,
/// sizing, per-tick advancement and reporting over its positions.
///
/// Single-writer: callers serialize access; nothing in here locks or
/// performs I/O on the mutation path (event sinks are best-effort).
pub struct Account {
    profile: StrategyProfile,
    exit_machine: ExitStateMachine,
    cash: f64,
    initial_capital: f64,
    active: Vec<Position>,
    closed: Vec<Position>,
    budget: RiskBudget,
    sinks: Vec<Box<dyn TradeEventSink>>,
}

impl Account {
    pub fn new(profile: StrategyProfile, initial_capital: f64) -> Result<Self, EngineError> {
        profile.validate()?;
        if initial_capital <= 0.0 {
            return Err(EngineError::ConfigError(format!(
                "initial capital {} must be positive",
                initial_capital
            )));
        }
        let exit_machine = ExitStateMachine::new(profile.exit_rules.clone())?;
        let budget = RiskBudget::new(
            profile.max_concurrent,
            profile.max_daily_loss_fraction,
            initial_capital,
        );
        info!(
            "Account [{}] initialized with capital {:.2}",
            profile.name, initial_capital
        );
        Ok(Self {
            profile,
            exit_machine,
            cash: initial_capital,
            initial_capital,
            active: Vec::new(),
            closed: Vec::new(),
            budget,
            sinks: Vec::new(),
        })
    }

    /// Register a best-effort consumer of trade events.
    pub fn add_sink(&mut self, sink: Box<dyn TradeEventSink>) {
        self.sinks.push(sink);
    }

    pub fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn active_positions(&self) -> &[Position] {
        &self.active
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    /// Cash plus mark-to-market of everything still open.
    pub fn equity(&self) -> f64 {
        self.cash + self.active.iter().map(|p| p.mark_to_market()).sum::<f64>()
    }

    pub fn sample_equity(&self, now: DateTime<Utc>) -> EquitySample {
        EquitySample {
            timestamp: now,
            cash: self.cash,
            equity: self.equity(),
        }
    }

    /// Re-base the daily loss breaker on a new trading day. Idempotent;
    /// also invoked internally by `process_signal` and `advance`.
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let equity = self.equity();
        self.budget.roll_day(now, equity);
    }

    /// Admission, sizing and entry for one signal. Rejections are normal
    /// negative results; only malformed rule tables are errors (and those
    /// are caught at construction).
    pub fn process_signal(&mut self, signal: &Signal) -> SignalOutcome {
        self.roll_day(signal.observed_at);

        if let Err(e) = signal.validate() {
            debug!("[{}] rejected {}: {}", self.profile.name, signal.symbol, e);
            return SignalOutcome::Rejected(RejectReason::InvalidReference(e.to_string()));
        }
        if signal.composite_score < self.profile.min_score {
            debug!(
                "[{}] rejected {}: score {:.1} < {:.1}",
                self.profile.name, signal.symbol, signal.composite_score, self.profile.min_score
            );
            return SignalOutcome::Rejected(RejectReason::ScoreBelowMinimum {
                score: signal.composite_score,
                min: self.profile.min_score,
            });
        }
        if let Err(reason) = self.budget.admits(self.active.len(), self.cash) {
            debug!("[{}] rejected {}: {}", self.profile.name, signal.symbol, reason);
            return SignalOutcome::Rejected(reason);
        }
        let sizing = match self.profile.sizing.size(signal.composite_score, self.cash) {
            Some(s) => s,
            None => return SignalOutcome::Rejected(RejectReason::ZeroSize),
        };

        let position = Position::open(signal, &self.profile.name, sizing.size, sizing.stop_fraction);
        self.cash -= sizing.size;
        self.active.push(position.clone());

        let event = TradeEvent {
            kind: TradeEventKind::Open,
            timestamp: signal.observed_at,
            position: position.clone(),
            fraction_sold: None,
            reason: None,
        };
        publish_all(&mut self.sinks, &event);

        SignalOutcome::Opened(position)
    }

    /// Run the exit machine for every active position on `token_id` at the
    /// observed value. Emits one event per state change.
    pub fn advance(&mut self, token_id: &TokenId, value: f64, now: DateTime<Utc>) -> Vec<TradeEvent> {
        self.roll_day(now);
        if !value.is_finite() || value <= 0.0 {
            debug!("Ignoring non-positive value {} for {}", value, token_id);
            return Vec::new();
        }

        let mut events = Vec::new();
        let machine = &self.exit_machine;
        let cash = &mut self.cash;
        for pos in self.active.iter_mut() {
            if &pos.token_id != token_id || !pos.is_open() {
                continue;
            }
            let outcome = machine.evaluate(pos, value, now);
            if outcome.is_noop() {
                continue;
            }
            for fill in outcome.fills {
                *cash += fill.proceeds;
                let fraction = fill.units / fill.position.initial_units;
                events.push(TradeEvent {
                    kind: TradeEventKind::PartialClose,
                    timestamp: now,
                    // Per-fill snapshot so multi-tier ticks replay cleanly
                    position: fill.position,
                    fraction_sold: Some(fraction),
                    reason: Some(format!("TP{}", fill.tier + 1)),
                });
            }
            if let Some((reason, proceeds)) = outcome.close {
                *cash += proceeds;
                events.push(TradeEvent {
                    kind: TradeEventKind::Close,
                    timestamp: now,
                    position: pos.clone(),
                    fraction_sold: None,
                    reason: Some(reason.to_string()),
                });
            }
        }
        self.sweep_closed();

        let equity = self.equity();
        self.budget.record_equity(equity);

        for event in &events {
            publish_all(&mut self.sinks, event);
        }
        events
    }

    /// What the paper-mode driver calls when it polls a fresh price or
    /// market-cap reading.
    pub fn apply_update(&mut self, update: &PriceUpdate) -> Vec<TradeEvent> {
        self.advance(&update.token_id, update.value, update.timestamp)
    }

    /// Force a full close outside the rule tables (end of data, manual).
    pub fn close_at(
        &mut self,
        token_id: &TokenId,
        value: f64,
        now: DateTime<Utc>,
        reason: ExitReason,
    ) -> Vec<TradeEvent> {
        let mut events = Vec::new();
        let cash = &mut self.cash;
        for pos in self.active.iter_mut() {
            if &pos.token_id != token_id || !pos.is_open() {
                continue;
            }
            let proceeds = pos.close(value, reason, now);
            *cash += proceeds;
            events.push(TradeEvent {
                kind: TradeEventKind::Close,
                timestamp: now,
                position: pos.clone(),
                fraction_sold: None,
                reason: Some(reason.to_string()),
            });
        }
        self.sweep_closed();

        let equity = self.equity();
        self.budget.record_equity(equity);

        for event in &events {
            publish_all(&mut self.sinks, event);
        }
        events
    }

    fn sweep_closed(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].is_open() {
                i += 1;
            } else {
                let pos = self.active.remove(i);
                self.closed.push(pos);
            }
        }
    }

    pub fn stats(&self) -> AccountStats {
        let wins = self
            .closed
            .iter()
            .filter(|p| p.realized_pnl > 0.0)
            .count();
        let losses = self.closed.len() - wins;
        let win_rate = if self.closed.is_empty() {
            0.0
        } else {
            wins as f64 / self.closed.len() as f64 * 100.0
        };
        let equity = self.equity();
        AccountStats {
            balance: self.cash,
            equity,
            roi_percent: (equity - self.initial_capital) / self.initial_capital * 100.0,
            trade_count: self.active.len() + self.closed.len(),
            wins,
            losses,
            win_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::risk::RejectReason;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn signal(n: usize, score: f64, value: f64, at: DateTime<Utc>) -> Signal {
        Signal {
            token_id: TokenId::new("solana", format!("MemeMint{:04}", n)),
            symbol: format!("MEME{}", n),
            observed_at: at,
            composite_score: score,
            reference_value: value,
        }
    }

    fn backtest_account() -> Account {
        Account::new(StrategyProfile::backtest_v3(), 200.0).unwrap()
    }

    #[test]
    fn test_open_debits_cash_and_emits() {
        let mut account = backtest_account();
        let outcome = account.process_signal(&signal(1, 95.0, 1.0, t0()));
        let pos = match outcome {
            SignalOutcome::Opened(p) => p,
            SignalOutcome::Rejected(r) => panic!("rejected: {}", r),
        };
        // 2.5% risk over 15% stop distance
        let expected = 200.0 * 0.025 / 0.15;
        assert!((pos.initial_size - expected).abs() < 1e-9);
        assert!((account.cash() - (200.0 - expected)).abs() < 1e-9);
        // Equity unchanged at entry: cash down, mark-to-market up
        assert!((account.equity() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_gate() {
        let mut account = backtest_account();
        let outcome = account.process_signal(&signal(1, 75.0, 1.0, t0()));
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectReason::ScoreBelowMinimum { .. })
        ));
    }

    #[test]
    fn test_invalid_reference_rejected_without_position() {
        let mut account = backtest_account();
        let outcome = account.process_signal(&signal(1, 95.0, 0.0, t0()));
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectReason::InvalidReference(_))
        ));
        assert!(account.active_positions().is_empty());
        assert_eq!(account.cash(), 200.0);
    }

    #[test]
    fn test_max_concurrent_respected_until_a_close() {
        let mut account = backtest_account();
        for n in 0..4 {
            let at = t0() + Duration::minutes(n as i64);
            assert!(account.process_signal(&signal(n, 95.0, 1.0, at)).is_opened());
        }
        let fifth = signal(4, 95.0, 1.0, t0() + Duration::minutes(4));
        assert!(matches!(
            account.process_signal(&fifth),
            SignalOutcome::Rejected(RejectReason::MaxConcurrent { .. })
        ));

        // Stop one out, capacity frees up
        let tid = TokenId::new("solana", "MemeMint0000");
        let events = account.advance(&tid, 0.5, t0() + Duration::minutes(5));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Close);
        assert!(account
            .process_signal(&signal(4, 95.0, 1.0, t0() + Duration::minutes(6)))
            .is_opened());
    }

    #[test]
    fn test_partial_and_full_close_events() {
        let mut account = backtest_account();
        account.process_signal(&signal(1, 95.0, 1.0, t0()));
        let tid = TokenId::new("solana", "MemeMint0001");

        // +50% fires TP1
        let events = account.advance(&tid, 1.5, t0() + Duration::minutes(5));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::PartialClose);
        assert!((events[0].fraction_sold.unwrap() - 0.50).abs() < 1e-12);

        // Stagnate out at minute 95 near break-even... stop is at entry
        // after TP1, so a fade closes as stop loss instead
        let events = account.advance(&tid, 0.99, t0() + Duration::minutes(95));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Close);
        assert_eq!(account.closed_positions().len(), 1);
        assert_eq!(
            account.closed_positions()[0].exit_reason,
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_breaker_trips_and_resets_on_rollover() {
        // daily_start_equity 200; a blown trade drags equity below 180
        let mut account = backtest_account();
        account.process_signal(&signal(1, 95.0, 1.0, t0()));
        let tid = TokenId::new("solana", "MemeMint0001");

        // Crash well through the stop: close at 0.2 loses ~80% of a 33.33
        // position -> equity ~173 (-13.5%)
        account.advance(&tid, 0.2, t0() + Duration::minutes(3));
        let equity = account.equity();
        assert!(equity < 180.0);

        // Same day: rejected by the breaker
        let outcome = account.process_signal(&signal(2, 95.0, 1.0, t0() + Duration::minutes(10)));
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectReason::LossBreakerTripped)
        ));

        // Next day: re-armed
        let outcome = account.process_signal(&signal(3, 95.0, 1.0, t0() + Duration::days(1)));
        assert!(outcome.is_opened());
    }

    #[test]
    fn test_stats_aggregate() {
        let mut account = backtest_account();
        account.process_signal(&signal(1, 95.0, 1.0, t0()));
        account.process_signal(&signal(2, 95.0, 1.0, t0()));

        // Token 1 wins (TP1 then trail out above entry), token 2 stops out
        let tid1 = TokenId::new("solana", "MemeMint0001");
        let tid2 = TokenId::new("solana", "MemeMint0002");
        account.advance(&tid1, 1.6, t0() + Duration::minutes(5));
        account.advance(&tid1, 1.02, t0() + Duration::minutes(6));
        account.advance(&tid2, 0.5, t0() + Duration::minutes(7));

        let stats = account.stats();
        assert_eq!(stats.trade_count, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert!((stats.win_rate - 50.0).abs() < 1e-9);
        assert!((stats.balance - stats.equity).abs() < 1e-9); // flat
    }

    #[test]
    fn test_close_at_forces_end_of_data() {
        let mut account = backtest_account();
        account.process_signal(&signal(1, 95.0, 1.0, t0()));
        let tid = TokenId::new("solana", "MemeMint0001");
        let events = account.close_at(&tid, 1.1, t0() + Duration::minutes(30), ExitReason::EndOfData);
        assert_eq!(events.len(), 1);
        assert_eq!(
            account.closed_positions()[0].exit_reason,
            Some(ExitReason::EndOfData)
        );
        assert!(account.active_positions().is_empty());
    }

    #[test]
    fn test_multi_tier_tick_emits_one_event_per_fill() {
        let mut account = backtest_account();
        account.process_signal(&signal(1, 95.0, 1.0, t0()));
        let tid = TokenId::new("solana", "MemeMint0001");

        // +110% fires TP1 and TP2 in the same tick
        let events = account.advance(&tid, 2.10, t0() + Duration::minutes(5));
        assert_eq!(events.len(), 2);
        assert!((events[0].fraction_sold.unwrap() - 0.50).abs() < 1e-12);
        assert!((events[1].fraction_sold.unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(events[0].reason.as_deref(), Some("TP1"));
        assert_eq!(events[1].reason.as_deref(), Some("TP2"));

        // The first event's embedded snapshot predates the second fill
        assert_eq!(events[0].position.hit_tiers, vec![0]);
        assert_eq!(events[1].position.hit_tiers, vec![0, 1]);
        let initial = events[0].position.initial_units;
        assert!((events[0].position.remaining_units - initial * 0.50).abs() < 1e-9);
        assert!((events[1].position.remaining_units - initial * 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_paper_profile_via_price_updates() {
        let mut account = Account::new(StrategyProfile::paper_conservative(), 200.0).unwrap();
        // Market-cap based entry: 5% of cash regardless of score
        let sig = signal(1, 90.0, 1_000_000.0, t0());
        let pos = match account.process_signal(&sig) {
            SignalOutcome::Opened(p) => p,
            SignalOutcome::Rejected(r) => panic!("rejected: {}", r),
        };
        assert!((pos.initial_size - 10.0).abs() < 1e-9);

        // 1.3M against a 2.0x target is 30% of potential: first rung sells 20%
        let update = PriceUpdate {
            token_id: sig.token_id.clone(),
            timestamp: t0() + Duration::minutes(5),
            value: 1_300_000.0,
        };
        let events = account.apply_update(&update);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::PartialClose);
        assert!((events[0].fraction_sold.unwrap() - 0.20).abs() < 1e-12);
    }

    proptest! {
        /// Cash never goes negative and the equity identity holds across
        /// arbitrary admissions and price paths.
        #[test]
        fn prop_cash_non_negative_and_equity_identity(
            seeds in proptest::collection::vec((60.0f64..100.0, 0.1f64..3.0), 1..12)
        ) {
            let mut account = backtest_account();
            let mut at = t0();
            for (n, (score, _)) in seeds.iter().enumerate() {
                account.process_signal(&signal(n, *score, 1.0, at));
                at = at + Duration::minutes(1);
            }
            for (n, (_, factor)) in seeds.iter().enumerate() {
                let tid = TokenId::new("solana", format!("MemeMint{:04}", n));
                // Walk the price around over a couple of hours
                for step in 1..6i64 {
                    let value = factor.powf(step as f64 / 5.0);
                    account.advance(&tid, value, at + Duration::minutes(step * 25));

                    prop_assert!(account.cash() >= -1e-9);
                    let mtm: f64 = account
                        .active_positions()
                        .iter()
                        .map(|p| p.mark_to_market())
                        .sum();
                    let sample = account.sample_equity(at);
                    prop_assert!((sample.equity - (sample.cash + mtm)).abs() < 1e-6);
                    for p in account.active_positions() {
                        prop_assert!(p.remaining_units <= p.initial_units + 1e-12);
                    }
                    for p in account.closed_positions() {
                        prop_assert!(p.remaining_units == 0.0);
                    }
                }
            }
        }
    }
}
