use serde::{Deserialize, Serialize};

/// How an entry gets sized from available cash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SizingMode {
    /// Risk a score-dependent fraction of cash against a fixed initial stop
    /// distance: size = risk_amount / stop_fraction. Higher-conviction
    /// signals risk more.
    RiskTiered { stop_fraction: f64 },
    /// Flat fraction of cash regardless of score, with a flat stop floor.
    FixedFraction { fraction: f64, stop_fraction: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub size: f64,
    pub stop_fraction: f64,
}

impl SizingMode {
    /// Conservative risk-tiered sizing with the v3 stop distance.
    pub fn risk_tiered_v3() -> Self {
        Self::RiskTiered { stop_fraction: 0.15 }
    }

    /// The paper trader's flat 5% sizing against a 30% floor.
    pub fn fixed_fraction_paper() -> Self {
        Self::FixedFraction {
            fraction: 0.05,
            stop_fraction: 0.30,
        }
    }

    /// Compute the entry size for a signal. Returns None when there is no
    /// cash to deploy or the computed size rounds to nothing.
    pub fn size(&self, composite_score: f64, cash: f64) -> Option<Sizing> {
        if cash <= 0.0 {
            return None;
        }
        let sizing = match *self {
            Self::RiskTiered { stop_fraction } => {
                let risk_fraction = if composite_score >= 90.0 {
                    0.025
                } else if composite_score >= 85.0 {
                    0.020
                } else {
                    0.015
                };
                let risk_amount = cash * risk_fraction;
                // Cap at available cash rather than over-exposing
                let size = (risk_amount / stop_fraction).min(cash);
                Sizing {
                    size,
                    stop_fraction,
                }
            }
            Self::FixedFraction {
                fraction,
                stop_fraction,
            } => Sizing {
                size: cash * fraction,
                stop_fraction,
            },
        };
        if sizing.size <= 0.0 {
            return None;
        }
        Some(sizing)
    }
}
