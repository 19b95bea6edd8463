use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::position::{ExitReason, Position};

/// One take-profit rung: once `progress` reaches `threshold`, sell
/// `sell_fraction` of the INITIAL units (capped at whatever is left).
/// Fires at most once per position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierRule {
    pub threshold: f64,
    pub sell_fraction: f64,
    /// Raise the stop to break-even when this tier fires.
    pub move_stop_to_entry: bool,
}

/// How "progress" is measured against the entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ProgressBasis {
    /// (current - entry) / entry
    Roi,
    /// (current - entry) / (target - entry), target = entry * base_potential.
    /// Same concept as ROI, normalized to an expected upside.
    PotentialUsed { base_potential: f64 },
}

impl ProgressBasis {
    pub fn progress(&self, entry: f64, current: f64) -> f64 {
        match *self {
            Self::Roi => (current - entry) / entry,
            Self::PotentialUsed { base_potential } => {
                let target = entry * base_potential;
                (current - entry) / (target - entry)
            }
        }
    }
}

/// Ratchet the stop under the peak once the move is large enough.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Peak ROI that arms the trail.
    pub activation: f64,
    /// Stop sits at peak * (1 - distance) once armed.
    pub distance: f64,
}

/// Tighten the stop to a hard floor below entry once the position has aged
/// past the early phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HardFloorRule {
    pub after_minutes: i64,
    pub floor_fraction: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum StagnationBand {
    /// progress in [lo, hi]
    Between { lo: f64, hi: f64 },
    /// progress below hi
    Below { hi: f64 },
}

impl StagnationBand {
    pub fn contains(&self, progress: f64) -> bool {
        match *self {
            Self::Between { lo, hi } => progress >= lo && progress <= hi,
            Self::Below { hi } => progress < hi,
        }
    }
}

/// Give up on positions that go nowhere for too long.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StagnationRule {
    pub after_minutes: i64,
    pub band: StagnationBand,
}

/// The full exit rule table for one strategy variant. Injected at
/// construction; the state machine itself has no mode-specific branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRules {
    pub hard_floor: Option<HardFloorRule>,
    pub trailing: Option<TrailingRule>,
    pub tiers: Vec<TierRule>,
    pub progress: ProgressBasis,
    pub stagnation: Option<StagnationRule>,
}

impl ExitRules {
    /// Backtest engine rule table (v3 strategy): ROI-based tiers with a
    /// break-even move on TP1, hard floor and trailing stop.
    pub fn backtest_v3() -> Self {
        Self {
            hard_floor: Some(HardFloorRule {
                after_minutes: 15,
                floor_fraction: 0.30,
            }),
            trailing: Some(TrailingRule {
                activation: 0.40,
                distance: 0.35,
            }),
            tiers: vec![
                TierRule {
                    threshold: 0.40,
                    sell_fraction: 0.50,
                    move_stop_to_entry: true,
                },
                TierRule {
                    threshold: 1.00,
                    sell_fraction: 0.25,
                    move_stop_to_entry: false,
                },
                TierRule {
                    threshold: 2.00,
                    sell_fraction: 0.15,
                    move_stop_to_entry: false,
                },
            ],
            progress: ProgressBasis::Roi,
            stagnation: Some(StagnationRule {
                after_minutes: 90,
                band: StagnationBand::Between { lo: -0.10, hi: 0.20 },
            }),
        }
    }

    /// Paper trader rule table: potential-used ladder against a flat floor,
    /// no tightening phase, no trailing.
    pub fn paper_potential(base_potential: f64) -> Self {
        Self {
            hard_floor: None,
            trailing: None,
            tiers: vec![
                TierRule {
                    threshold: 0.30,
                    sell_fraction: 0.20,
                    move_stop_to_entry: false,
                },
                TierRule {
                    threshold: 0.50,
                    sell_fraction: 0.25,
                    move_stop_to_entry: false,
                },
                TierRule {
                    threshold: 0.70,
                    sell_fraction: 0.30,
                    move_stop_to_entry: false,
                },
            ],
            progress: ProgressBasis::PotentialUsed { base_potential },
            stagnation: Some(StagnationRule {
                after_minutes: 90,
                band: StagnationBand::Below { hi: 0.30 },
            }),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let mut prev_threshold = 0.0;
        let mut total_fraction = 0.0;
        for (i, tier) in self.tiers.iter().enumerate() {
            if !tier.threshold.is_finite() || tier.threshold <= prev_threshold {
                return Err(EngineError::ConfigError(format!(
                    "tier {} threshold {} must be positive and strictly ascending",
                    i, tier.threshold
                )));
            }
            if !tier.sell_fraction.is_finite()
                || tier.sell_fraction <= 0.0
                || tier.sell_fraction > 1.0
            {
                return Err(EngineError::ConfigError(format!(
                    "tier {} sell fraction {} must be in (0, 1]",
                    i, tier.sell_fraction
                )));
            }
            prev_threshold = tier.threshold;
            total_fraction += tier.sell_fraction;
        }
        if total_fraction >= 1.0 {
            return Err(EngineError::ConfigError(format!(
                "tier sell fractions sum to {}, must stay below 1.0",
                total_fraction
            )));
        }
        if let Some(tr) = &self.trailing {
            if tr.activation <= 0.0 || tr.distance <= 0.0 || tr.distance >= 1.0 {
                return Err(EngineError::ConfigError(format!(
                    "trailing rule activation={} distance={} out of range",
                    tr.activation, tr.distance
                )));
            }
        }
        if let Some(hf) = &self.hard_floor {
            if hf.after_minutes <= 0 || hf.floor_fraction <= 0.0 || hf.floor_fraction >= 1.0 {
                return Err(EngineError::ConfigError(format!(
                    "hard floor after_minutes={} floor_fraction={} out of range",
                    hf.after_minutes, hf.floor_fraction
                )));
            }
        }
        if let ProgressBasis::PotentialUsed { base_potential } = self.progress {
            if base_potential <= 1.0 {
                return Err(EngineError::ConfigError(format!(
                    "base potential {} must exceed 1.0",
                    base_potential
                )));
            }
        }
        if let Some(st) = &self.stagnation {
            if st.after_minutes <= 0 {
                return Err(EngineError::ConfigError(
                    "stagnation window must be positive".to_string(),
                ));
            }
            if let StagnationBand::Between { lo, hi } = st.band {
                if lo >= hi {
                    return Err(EngineError::ConfigError(format!(
                        "stagnation band [{}, {}] is empty",
                        lo, hi
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A take-profit fill produced by one tick. `position` is the state
/// immediately after this sale, so consumers of multi-fill ticks can
/// replay the transitions one at a time.
#[derive(Debug, Clone)]
pub struct Fill {
    pub tier: usize,
    pub units: f64,
    pub proceeds: f64,
    pub position: Position,
}

/// Everything a single evaluation did to a position. Cash movement is the
/// Account's job; the outcome carries the proceeds to credit.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub fills: Vec<Fill>,
    pub close: Option<(ExitReason, f64)>,
}

impl TickOutcome {
    pub fn is_noop(&self) -> bool {
        self.fills.is_empty() && self.close.is_none()
    }

    fn closed(reason: ExitReason, proceeds: f64) -> Self {
        Self {
            fills: Vec::new(),
            close: Some((reason, proceeds)),
        }
    }
}

/// Evaluates the stop-loss / trailing / take-profit / time-exit rules for
/// one position per tick. Holds nothing but the injected rule table, so
/// identical inputs always produce identical outcomes.
#[derive(Debug, Clone)]
pub struct ExitStateMachine {
    rules: ExitRules,
}

impl ExitStateMachine {
    pub fn new(rules: ExitRules) -> Result<Self, EngineError> {
        rules.validate()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &ExitRules {
        &self.rules
    }

    /// One tick for one open position. Hard exits are checked first; tiers
    /// fire independently in ascending order within the same tick.
    pub fn evaluate(
        &self,
        pos: &mut Position,
        value: f64,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if !pos.is_open() {
            return TickOutcome::default();
        }

        pos.note_value(value);

        if value <= pos.stop_level {
            let proceeds = pos.close(value, ExitReason::StopLoss, now);
            return TickOutcome::closed(ExitReason::StopLoss, proceeds);
        }

        let elapsed = pos.holding_minutes(now);

        if let Some(hf) = &self.rules.hard_floor {
            if elapsed > hf.after_minutes {
                // No-op when the trail has already lifted the stop higher
                pos.raise_stop(pos.entry_value * (1.0 - hf.floor_fraction));
            }
        }

        if let Some(tr) = &self.rules.trailing {
            let peak_roi = pos.roi(pos.peak_value);
            if peak_roi >= tr.activation {
                pos.raise_stop(pos.peak_value * (1.0 - tr.distance));
            }
        }

        let progress = self.rules.progress.progress(pos.entry_value, value);

        let mut outcome = TickOutcome::default();
        for (i, tier) in self.rules.tiers.iter().enumerate() {
            if pos.hit_tiers.contains(&i) || progress < tier.threshold {
                continue;
            }
            let units = (tier.sell_fraction * pos.initial_units).min(pos.remaining_units);
            if units <= 0.0 {
                continue;
            }
            let proceeds = pos.sell_units(units, value);
            pos.hit_tiers.push(i);
            if tier.move_stop_to_entry {
                pos.raise_stop(pos.entry_value);
            }
            outcome.fills.push(Fill {
                tier: i,
                units,
                proceeds,
                position: pos.clone(),
            });
        }

        if let Some(st) = &self.rules.stagnation {
            if elapsed >= st.after_minutes && st.band.contains(progress) {
                let proceeds = pos.close(value, ExitReason::TimeExit, now);
                outcome.close = Some((ExitReason::TimeExit, proceeds));
            }
        }

        outcome
    }
}
