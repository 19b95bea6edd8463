use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Identifies a token across chains. Two tokens with the same address on
/// different chains are different tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub chain: String,
    pub address: String,
}

impl TokenId {
    pub fn new(chain: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            address: address.into(),
        }
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

/// A scored entry candidate produced by the discovery/filter pipeline.
/// `reference_value` is the price or market-cap proxy at observation time;
/// downstream everything is tracked relative to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub token_id: TokenId,
    pub symbol: String,
    pub observed_at: DateTime<Utc>,
    pub composite_score: f64, // 0-100
    pub reference_value: f64,
}

impl Signal {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.reference_value.is_finite() || self.reference_value <= 0.0 {
            return Err(EngineError::InvalidSignal(format!(
                "non-positive reference value {} for {}",
                self.reference_value, self.token_id
            )));
        }
        if !self.composite_score.is_finite()
            || self.composite_score < 0.0
            || self.composite_score > 100.0
        {
            return Err(EngineError::InvalidSignal(format!(
                "composite score {} out of range for {}",
                self.composite_score, self.token_id
            )));
        }
        Ok(())
    }
}

/// A single price or market-cap observation pushed by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub token_id: TokenId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}
