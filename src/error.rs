use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Backtest error: {0}")]
    BacktestError(String),
}
