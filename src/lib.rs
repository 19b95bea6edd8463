//! Trade-simulation and risk-management engine for newly listed memecoin
//! signals. The discovery/scoring pipeline and alert delivery live outside
//! this crate; they push [`models::Signal`]s and price updates in and get
//! [`models::TradeEvent`]s back.
//!
//! The same engine backs the always-on paper traders and the offline
//! backtest: strategy variants differ only by their injected
//! [`trading::StrategyProfile`] rule tables.

pub mod backtest;
pub mod config;
pub mod error;
pub mod models;
pub mod trading;
