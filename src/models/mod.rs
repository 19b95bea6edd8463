pub mod position;
pub mod signal;

// Re-export commonly used types
pub use position::{
    EquitySample, ExitReason, Position, PositionStatus, TradeEvent, TradeEventKind,
};
pub use signal::{PriceUpdate, Signal, TokenId};
