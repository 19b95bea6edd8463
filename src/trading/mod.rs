pub mod account;
pub mod events;
pub mod exit;
pub mod risk;
pub mod sizing;
pub mod strategy;

pub use account::{Account, AccountStats, SignalOutcome};
pub use events::{JsonlEventLog, LogSink, TradeEventSink};
pub use exit::{ExitRules, ExitStateMachine, ProgressBasis, StagnationBand, TierRule};
pub use risk::{RejectReason, RiskBudget};
pub use sizing::SizingMode;
pub use strategy::StrategyProfile;
