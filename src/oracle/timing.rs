// Non-constant-time decryption: Montgomery square-and-multiply over the bits
// of the private exponent, where every set bit costs an extra multiply and
// every extra Montgomery reduction costs a little more time.

use super::TimingOracle;
use crate::{KeyMaterial, Montgomery, PublicKey, Result, Step};

use num_bigint::BigUint;
use rand::{rngs::StdRng, Rng, SeedableRng};

use std::time::{Duration, Instant};

/// Cost of each operation in the simulated exponentiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProfile {
    pub square: Duration,
    pub multiply: Duration,
    pub extra_reduction: Duration,
    /// Upper bound of uniformly distributed measurement noise per call.
    pub jitter: Option<Duration>,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            square: Duration::from_nanos(900),
            multiply: Duration::from_nanos(1000),
            extra_reduction: Duration::from_nanos(120),
            jitter: None,
        }
    }
}

/// A timing oracle that reports the modelled cost of the exponentiation rather
/// than measuring a clock. Without jitter it is fully deterministic.
#[derive(Debug, Clone)]
pub struct SimulatedTimingOracle {
    montgomery: Montgomery,
    exponent: BigUint,
    profile: TimingProfile,
    rng: StdRng,
}

impl SimulatedTimingOracle {
    pub fn new(keys: &KeyMaterial, profile: TimingProfile, seed: u64) -> Result<Self> {
        Self::with_exponent(keys.public(), keys.d.clone(), profile, seed)
    }

    /// Time exponentiation by an arbitrary secret `exponent` modulo `public.n`.
    pub fn with_exponent(
        public: &PublicKey,
        exponent: BigUint,
        profile: TimingProfile,
        seed: u64,
    ) -> Result<Self> {
        Ok(Self {
            montgomery: Montgomery::new(&public.n)?,
            exponent,
            profile,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Decrypt and return both the plaintext and the modelled duration.
    pub fn decrypt(&mut self, ciphertext: &BigUint) -> (BigUint, Duration) {
        let profile = self.profile;
        let mut elapsed = Duration::ZERO;
        let plaintext = self
            .montgomery
            .pow_observed(ciphertext, &self.exponent, |step, extra| {
                elapsed += match step {
                    Step::Square => profile.square,
                    Step::Multiply => profile.multiply,
                };
                if extra {
                    elapsed += profile.extra_reduction;
                }
            });
        if let Some(jitter) = profile.jitter {
            let max = jitter.as_nanos() as u64;
            if max > 0 {
                elapsed += Duration::from_nanos(self.rng.gen_range(0..max));
            }
        }
        (plaintext, elapsed)
    }
}

impl TimingOracle for SimulatedTimingOracle {
    fn decrypt_with_timing(&mut self, ciphertext: &BigUint) -> Duration {
        self.decrypt(ciphertext).1
    }
}

/// A timing oracle measured with a real clock. Each extra reduction is padded
/// with a busy wait so the leak stands out from scheduler noise.
#[derive(Debug, Clone)]
pub struct WallClockTimingOracle {
    montgomery: Montgomery,
    exponent: BigUint,
    extra_reduction_delay: Duration,
}

impl WallClockTimingOracle {
    pub fn new(keys: &KeyMaterial, extra_reduction_delay: Duration) -> Result<Self> {
        Ok(Self {
            montgomery: Montgomery::new(keys.n())?,
            exponent: keys.d.clone(),
            extra_reduction_delay,
        })
    }

    pub fn decrypt(&self, ciphertext: &BigUint) -> (BigUint, Duration) {
        let start = Instant::now();
        let plaintext = self
            .montgomery
            .pow_observed(ciphertext, &self.exponent, |_, extra| {
                if extra {
                    busy_wait(self.extra_reduction_delay);
                }
            });
        (plaintext, start.elapsed())
    }
}

impl TimingOracle for WallClockTimingOracle {
    fn decrypt_with_timing(&mut self, ciphertext: &BigUint) -> Duration {
        self.decrypt(ciphertext).1
    }
}

fn busy_wait(delay: Duration) {
    let start = Instant::now();
    while start.elapsed() < delay {
        std::hint::spin_loop();
    }
}
