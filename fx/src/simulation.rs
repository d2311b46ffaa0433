//! Randomized rate source for demo and test deployments.
//!
//! The simulator produces [`RawRates`] shaped exactly like a provider
//! response, so a simulated cycle goes through the same enrichment as a
//! live one.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ratecast_common::{constants, unix_seconds_now, CurrencyDirectory, RateSnapshot, RawRates};

/// Generates plausible rate movements without calling the provider.
pub struct RateSimulator {
    rng: Mutex<StdRng>,
    base: String,
}

impl RateSimulator {
    /// Create a simulator seeded from system entropy.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            base: base.into(),
        }
    }

    /// Create a reproducible simulator.
    pub fn seeded(base: impl Into<String>, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            base: base.into(),
        }
    }

    /// Produce the next set of rates.
    ///
    /// With a prior snapshot every known rate is scaled by a factor drawn
    /// from `[0.95, 1.05)`. Without one, every non-base currency in the
    /// directory gets a fresh rate below 100.
    pub fn simulate(
        &self,
        directory: &CurrencyDirectory,
        current: Option<&RateSnapshot>,
    ) -> RawRates {
        let mut rng = self.rng.lock();

        match current {
            Some(snapshot) => RawRates {
                base: snapshot.base.clone(),
                timestamp: unix_seconds_now(),
                rates: snapshot
                    .rates
                    .iter()
                    .map(|entry| {
                        let factor =
                            rng.gen_range(constants::PERTURBATION_MIN..constants::PERTURBATION_MAX);
                        (entry.code.clone(), entry.rate * factor)
                    })
                    .collect(),
            },
            None => RawRates {
                base: self.base.clone(),
                timestamp: unix_seconds_now(),
                rates: directory
                    .codes()
                    .filter(|code| *code != self.base)
                    .map(|code| {
                        // Zero is excluded so simulated rates stay strictly positive.
                        let rate = rng.gen_range(f64::MIN_POSITIVE..constants::SIMULATED_RATE_MAX);
                        (code.to_string(), rate)
                    })
                    .collect(),
            },
        }
    }
}
