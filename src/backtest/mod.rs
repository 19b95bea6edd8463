pub mod clock;
pub mod simulator;

pub use clock::{BacktestClock, BacktestResult, PriceSample};
pub use simulator::MarketSimulator;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::account::Account;
    use crate::trading::strategy::StrategyProfile;
    use chrono::{TimeZone, Utc};

    /// Two full runs over the same seeded market produce identical equity
    /// curves and closed-position lists.
    #[test]
    fn test_backtest_is_deterministic_end_to_end() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        let run = || {
            let (signals, paths) = MarketSimulator::new(start, 30, 4242).generate(15);
            let mut account = Account::new(StrategyProfile::backtest_v3(), 200.0).unwrap();
            BacktestClock::new().run(&mut account, signals, paths).unwrap()
        };

        let a = run();
        let b = run();

        assert_eq!(a.final_capital, b.final_capital);
        assert_eq!(a.equity_curve.len(), b.equity_curve.len());
        for (x, y) in a.equity_curve.iter().zip(b.equity_curve.iter()) {
            assert_eq!(x.timestamp, y.timestamp);
            assert_eq!(x.cash, y.cash);
            assert_eq!(x.equity, y.equity);
        }
        assert_eq!(a.positions.len(), b.positions.len());
        for (x, y) in a.positions.iter().zip(b.positions.iter()) {
            assert_eq!(x.token_id, y.token_id);
            assert_eq!(x.entry_time, y.entry_time);
            assert_eq!(x.exit_reason, y.exit_reason);
            assert_eq!(x.realized_pnl, y.realized_pnl);
        }
    }
}
