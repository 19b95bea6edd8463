use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::backtest::clock::PriceSample;
use crate::models::signal::{Signal, TokenId};

const PATH_MINUTES: usize = 1440; // 24h of 1-minute samples
const NOISE_STD: f64 = 0.02;
const RUG_PROBABILITY: f64 = 0.10;
const RUG_RETURN: f64 = -0.90;
const PRICE_FLOOR: f64 = 0.000_000_01;

/// The shape of a synthetic token's first 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    Moon,
    Dump,
    Chop,
    VolatileUp,
}

/// Produces regime-conditioned random price paths (plus the signals that
/// point at them) for validating the engine. Fully determined by the seed:
/// the same seed always yields the same market.
pub struct MarketSimulator {
    rng: StdRng,
    start: DateTime<Utc>,
    days: i64,
}

impl MarketSimulator {
    pub fn new(start: DateTime<Utc>, days: i64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start,
            days,
        }
    }

    /// Generate `num_signals` scored signals scattered over the window and
    /// a 24h minute-resolution price path for each.
    pub fn generate(
        &mut self,
        num_signals: usize,
    ) -> (Vec<Signal>, HashMap<TokenId, Vec<PriceSample>>) {
        info!(
            "Generating {} synthetic signals over {} days",
            num_signals, self.days
        );

        let window_minutes = self.days * 24 * 60;
        let mut offsets: Vec<i64> = (0..num_signals)
            .map(|_| self.rng.gen_range(0..window_minutes))
            .collect();
        offsets.sort_unstable();

        let mut signals = Vec::with_capacity(num_signals);
        let mut paths = HashMap::with_capacity(num_signals);
        for (i, offset) in offsets.into_iter().enumerate() {
            let observed_at = self.start + Duration::minutes(offset);
            let token_id = TokenId::new("solana", format!("SimMint{:04}", i));
            let score = *pick(&mut self.rng, &[75.0, 82.0, 88.0, 92.0, 95.0]);
            let initial_price = self.rng.gen_range(0.0001..0.01);

            signals.push(Signal {
                token_id: token_id.clone(),
                symbol: format!("MEME{}", i),
                observed_at,
                composite_score: score,
                reference_value: initial_price,
            });
            paths.insert(token_id, self.price_path(observed_at, initial_price));
        }

        (signals, paths)
    }

    /// One 24h path: Gaussian noise plus a regime drift, with an occasional
    /// single-minute rug pull. Prices never reach zero.
    fn price_path(&mut self, start: DateTime<Utc>, start_price: f64) -> Vec<PriceSample> {
        let regime = *pick(
            &mut self.rng,
            &[Regime::Moon, Regime::Dump, Regime::Chop, Regime::VolatileUp],
        );

        let mut returns: Vec<f64> = (0..PATH_MINUTES)
            .map(|_| self.normal(0.0, NOISE_STD))
            .collect();
        let last = (PATH_MINUTES - 1) as f64;
        for (i, r) in returns.iter_mut().enumerate() {
            let drift = match regime {
                Regime::Moon => 0.002 * i as f64 / last,
                Regime::Dump => -0.003 * i as f64 / last,
                Regime::Chop => 0.0,
                Regime::VolatileUp => self.normal(0.0005, 0.01),
            };
            *r += drift;
        }
        if self.rng.gen::<f64>() < RUG_PROBABILITY {
            let rug_idx = self.rng.gen_range(10..200);
            returns[rug_idx] = RUG_RETURN;
        }

        let mut price = start_price;
        returns
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                price = (price * (1.0 + r)).max(PRICE_FLOOR);
                PriceSample {
                    timestamp: start + Duration::minutes(i as i64),
                    value: price,
                }
            })
            .collect()
    }

    /// Standard normal via Box-Muller, scaled.
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1: f64 = self.rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = self.rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_paths_have_full_day_of_positive_minutes() {
        let mut sim = MarketSimulator::new(start(), 10, 7);
        let (signals, paths) = sim.generate(5);
        assert_eq!(signals.len(), 5);
        assert_eq!(paths.len(), 5);
        for sig in &signals {
            let path = &paths[&sig.token_id];
            assert_eq!(path.len(), PATH_MINUTES);
            assert_eq!(path[0].timestamp, sig.observed_at);
            assert_eq!(
                path[PATH_MINUTES - 1].timestamp,
                sig.observed_at + Duration::minutes(PATH_MINUTES as i64 - 1)
            );
            for s in path {
                assert!(s.value >= PRICE_FLOOR);
            }
        }
    }

    #[test]
    fn test_signals_sorted_and_scored() {
        let mut sim = MarketSimulator::new(start(), 30, 99);
        let (signals, _) = sim.generate(20);
        for pair in signals.windows(2) {
            assert!(pair[0].observed_at <= pair[1].observed_at);
        }
        for sig in &signals {
            assert!([75.0, 82.0, 88.0, 92.0, 95.0].contains(&sig.composite_score));
            assert!(sig.reference_value > 0.0);
            assert!(sig.validate().is_ok());
        }
    }

    #[test]
    fn test_same_seed_same_market() {
        let (signals_a, paths_a) = MarketSimulator::new(start(), 20, 1234).generate(10);
        let (signals_b, paths_b) = MarketSimulator::new(start(), 20, 1234).generate(10);

        assert_eq!(signals_a.len(), signals_b.len());
        for (a, b) in signals_a.iter().zip(signals_b.iter()) {
            assert_eq!(a.token_id, b.token_id);
            assert_eq!(a.observed_at, b.observed_at);
            assert_eq!(a.composite_score, b.composite_score);
            assert_eq!(a.reference_value, b.reference_value);
        }
        for (token, path_a) in &paths_a {
            let path_b = &paths_b[token];
            for (a, b) in path_a.iter().zip(path_b.iter()) {
                assert_eq!(a.timestamp, b.timestamp);
                assert_eq!(a.value, b.value);
            }
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let (_, paths_a) = MarketSimulator::new(start(), 20, 1).generate(3);
        let (_, paths_b) = MarketSimulator::new(start(), 20, 2).generate(3);
        let a = paths_a.values().next().unwrap();
        let b = paths_b.values().next().unwrap();
        assert!(a.iter().zip(b.iter()).any(|(x, y)| x.value != y.value));
    }
}
