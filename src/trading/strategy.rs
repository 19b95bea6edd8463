use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::trading::exit::ExitRules;
use crate::trading::sizing::SizingMode;

/// Everything that makes one strategy variant behave differently from
/// another: the admission score gate, the caps, and the sizing/exit rule
/// tables. Accounts are constructed from a profile; nothing in the engine
/// branches on a strategy name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub name: String,
    pub min_score: f64,
    pub max_concurrent: usize,
    pub max_daily_loss_fraction: f64,
    pub sizing: SizingMode,
    pub exit_rules: ExitRules,
}

impl StrategyProfile {
    /// The backtest engine's v3 strategy: risk-tiered sizing, ROI ladder.
    pub fn backtest_v3() -> Self {
        Self {
            name: "backtest-v3".to_string(),
            min_score: 80.0,
            max_concurrent: 4,
            max_daily_loss_fraction: 0.10,
            sizing: SizingMode::risk_tiered_v3(),
            exit_rules: ExitRules::backtest_v3(),
        }
    }

    /// Paper variant that only takes high-conviction signals.
    pub fn paper_conservative() -> Self {
        Self {
            name: "paper-conservative".to_string(),
            min_score: 85.0,
            max_concurrent: 4,
            max_daily_loss_fraction: 0.10,
            sizing: SizingMode::fixed_fraction_paper(),
            exit_rules: ExitRules::paper_potential(2.0),
        }
    }

    /// Paper variant with a looser score gate, same sizing and ladder.
    pub fn paper_degen() -> Self {
        Self {
            name: "paper-degen".to_string(),
            min_score: 70.0,
            max_concurrent: 4,
            max_daily_loss_fraction: 0.10,
            sizing: SizingMode::fixed_fraction_paper(),
            exit_rules: ExitRules::paper_potential(2.0),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.is_empty() {
            return Err(EngineError::ConfigError(
                "strategy profile needs a name".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_score) {
            return Err(EngineError::ConfigError(format!(
                "min score {} out of range",
                self.min_score
            )));
        }
        if self.max_concurrent == 0 {
            return Err(EngineError::ConfigError(
                "max concurrent positions must be at least 1".to_string(),
            ));
        }
        if self.max_daily_loss_fraction <= 0.0 || self.max_daily_loss_fraction >= 1.0 {
            return Err(EngineError::ConfigError(format!(
                "daily loss fraction {} out of range",
                self.max_daily_loss_fraction
            )));
        }
        let stop_fraction = match self.sizing {
            SizingMode::RiskTiered { stop_fraction } => stop_fraction,
            SizingMode::FixedFraction {
                fraction,
                stop_fraction,
            } => {
                if fraction <= 0.0 || fraction > 1.0 {
                    return Err(EngineError::ConfigError(format!(
                        "sizing fraction {} out of range",
                        fraction
                    )));
                }
                stop_fraction
            }
        };
        if stop_fraction <= 0.0 || stop_fraction >= 1.0 {
            return Err(EngineError::ConfigError(format!(
                "stop fraction {} out of range",
                stop_fraction
            )));
        }
        self.exit_rules.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_coherent() {
        assert!(StrategyProfile::backtest_v3().validate().is_ok());
        assert!(StrategyProfile::paper_conservative().validate().is_ok());
        assert!(StrategyProfile::paper_degen().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_caps() {
        let mut profile = StrategyProfile::backtest_v3();
        profile.max_concurrent = 0;
        assert!(profile.validate().is_err());

        let mut profile = StrategyProfile::backtest_v3();
        profile.max_daily_loss_fraction = 1.5;
        assert!(profile.validate().is_err());

        let mut profile = StrategyProfile::paper_conservative();
        profile.sizing = SizingMode::FixedFraction {
            fraction: 0.0,
            stop_fraction: 0.30,
        };
        assert!(profile.validate().is_err());
    }
}
