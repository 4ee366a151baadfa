//! Perturbation Sources
//!
//! Injectable entropy for the simulated feed.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::{Decimal, RoundingStrategy};

/// Digits kept from the raw random unit before scaling into the range
const UNIT_PRECISION: u32 = 12;

/// Source of perturbation factors
pub trait RateJitter: Send + Sync {
    /// Next value in `[low, high)`. Returns `low` for an empty range.
    fn next_factor(&self, low: Decimal, high: Decimal) -> Decimal;
}

/// Uniform random factors from a `StdRng`
pub struct RandomJitter {
    rng: Mutex<StdRng>,
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomJitter {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Reproducible sequence
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl RateJitter for RandomJitter {
    fn next_factor(&self, low: Decimal, high: Decimal) -> Decimal {
        if high <= low {
            return low;
        }

        let raw: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            rng.gen_range(0.0..1.0)
        };
        // Truncate so the unit stays strictly below one
        let unit = Decimal::from_f64_retain(raw)
            .unwrap_or(Decimal::ZERO)
            .round_dp_with_strategy(UNIT_PRECISION, RoundingStrategy::ToZero);

        low + (high - low) * unit
    }
}

/// Always the same factor, whatever the range. For tests.
pub struct FixedJitter(pub Decimal);

impl RateJitter for FixedJitter {
    fn next_factor(&self, _low: Decimal, _high: Decimal) -> Decimal {
        self.0
    }
}
