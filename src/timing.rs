// Timing attack on Montgomery square-and-multiply, recovering a private
// exponent one bit at a time, most significant first.
//
// The victim computes c^d with left-to-right square-and-multiply, and a
// Montgomery product costs slightly more when it needs its final subtraction.
// Knowing n, an attacker who has recovered the top bits of d can replay the
// exponentiation of any ciphertext up to the current bit. From there the two
// hypotheses predict different operations:
//
//   bit = 1:  sq = acc * acc, then sq * c        (H1: does sq * c reduce?)
//   bit = 0:  sq = acc * acc, then next sq * sq   (H0: does sq * sq reduce?)
//
// Only the operations that actually happen contribute to the measured time.
// So if we split the sample set by the predicted H1 event, the two halves
// have visibly different mean times exactly when the bit is 1, and the same
// holds for H0 when the bit is 0. We compare the two separations as t-scores
// and keep the larger.
//
// How often a product by c needs the extra reduction grows with c's
// Montgomery form, and c is multiplied in at every set bit. With random
// ciphertexts the H1 split therefore also sorts samples by how slow all of
// their multiplies are, whatever the current bit. So the attacker chooses the
// ciphertexts instead: every Montgomery base is drawn from a narrow band just
// below n, which keeps the per-multiply rate the same for every sample and
// leaves only the intermediate values to vary.
//
// The last bit has no following square to look at, but by then every other
// bit is known and the two candidate exponents can be checked against the
// public key directly.

use crate::{modpow, Error, Montgomery, PublicKey, Result, TimingOracle};

use log::{debug, info, warn};
use num_bigint::{BigInt, BigUint, RandBigInt};
use num_traits::{One, ToPrimitive, Zero};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Messages used to tell the two final exponent candidates apart.
const CHECK_MESSAGES: [u32; 3] = [2, 3, 5];

/// Montgomery bases are drawn from the top `n >> BASE_BAND_SHIFT` values
/// below n.
const BASE_BAND_SHIFT: u32 = 8;

/// Exponent bits recovered so far, most significant first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExponentPrefix {
    bits: Vec<bool>,
}

impl ExponentPrefix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// The prefix read as a big-endian binary number.
    pub fn to_biguint(&self) -> BigUint {
        self.bits.iter().fold(BigUint::zero(), |acc, &bit| {
            let acc = acc << 1u32;
            if bit {
                acc + 1u32
            } else {
                acc
            }
        })
    }
}

impl fmt::Display for ExponentPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits.is_empty() {
            return write!(f, "<none>");
        }
        for &bit in &self.bits {
            write!(f, "{}", if bit { '1' } else { '0' })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingAttackConfig {
    /// Random ciphertexts measured up front, and added on every retry.
    pub ciphertexts: usize,
    /// Timings summed per ciphertext to average out measurement noise.
    pub samples_per_ciphertext: usize,
    /// Stop after this many bits instead of recovering the whole exponent.
    pub max_bits: Option<usize>,
    /// How often the sample set may be extended for an unclear bit.
    pub max_retries: u32,
    /// Minimum gap between the hypotheses' z-scores, in thousandths.
    pub decision_margin: u64,
    /// Seed for the random ciphertexts.
    pub seed: u64,
}

impl Default for TimingAttackConfig {
    fn default() -> Self {
        Self {
            ciphertexts: 8000,
            samples_per_ciphertext: 1,
            max_bits: None,
            max_retries: 2,
            decision_margin: 2000,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredExponent {
    pub prefix: ExponentPrefix,
    /// The prefix as an integer. Equal to the private exponent when
    /// `complete` is set.
    pub exponent: BigUint,
    pub complete: bool,
    /// Timing measurements requested from the oracle.
    pub measurements: u64,
    pub elapsed: Duration,
}

/// Recover the `exponent_bits`-bit private exponent behind `oracle`.
pub fn timing_attack(
    public: &PublicKey,
    exponent_bits: u64,
    oracle: &mut impl TimingOracle,
    config: &TimingAttackConfig,
) -> Result<RecoveredExponent> {
    TimingAttack::new(public, oracle, config.clone())?.run(exponent_bits)
}

/// A measured ciphertext and the attacker's replay of the victim's
/// exponentiation through the bits recovered so far.
struct Sample {
    base: BigUint,
    state: BigUint,
    nanos: u128,
}

pub struct TimingAttack<'a, O: TimingOracle> {
    public: &'a PublicKey,
    oracle: &'a mut O,
    config: TimingAttackConfig,
    montgomery: Montgomery,
    rng: StdRng,
    samples: Vec<Sample>,
    prefix: ExponentPrefix,
    measurements: u64,
}

impl<'a, O: TimingOracle> TimingAttack<'a, O> {
    /// Fails with `NotInvertible` if the modulus is even.
    pub fn new(
        public: &'a PublicKey,
        oracle: &'a mut O,
        config: TimingAttackConfig,
    ) -> Result<Self> {
        Ok(Self {
            public,
            oracle,
            montgomery: Montgomery::new(&public.n)?,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            samples: Vec::new(),
            prefix: ExponentPrefix::new(),
            measurements: 0,
        })
    }

    pub fn run(mut self, exponent_bits: u64) -> Result<RecoveredExponent> {
        let started = Instant::now();
        let exponent_bits = usize::try_from(exponent_bits).unwrap_or(usize::MAX);
        let target = self
            .config
            .max_bits
            .map_or(exponent_bits, |max| max.min(exponent_bits));
        info!(
            "starting timing attack on a {}-bit modulus, {} of {} exponent bits",
            self.public.bits(),
            target,
            exponent_bits
        );

        if target > 0 {
            // The top bit of the exponent is one by definition.
            self.prefix.push(true);
            self.measure(self.config.ciphertexts);
        }

        for position in 1..target {
            let bit = if position + 1 == exponent_bits {
                self.decide_last_bit()
            } else {
                self.decide_bit(position)?
            };
            debug!("bit {} of {} is {}", position, exponent_bits, bit as u8);
            self.advance(bit);
            self.prefix.push(bit);
        }

        let elapsed = started.elapsed();
        let exponent = self.prefix.to_biguint();
        info!(
            "recovered {} exponent bits from {} measurements ({:?})",
            self.prefix.len(),
            self.measurements,
            elapsed
        );
        Ok(RecoveredExponent {
            complete: self.prefix.len() == exponent_bits,
            prefix: self.prefix,
            exponent,
            measurements: self.measurements,
            elapsed,
        })
    }

    /// A ciphertext whose Montgomery form lies just below n, and that form.
    fn choose_ciphertext(&mut self) -> (BigUint, BigUint) {
        let n = self.montgomery.modulus();
        let band = (n >> BASE_BAND_SHIFT).max(BigUint::one());
        let base = n - 1u32 - self.rng.gen_biguint_below(&band);
        (self.montgomery.from_montgomery(&base), base)
    }

    /// Measure `count` fresh chosen ciphertexts and replay the known prefix
    /// for each.
    fn measure(&mut self, count: usize) {
        let repeats = self.config.samples_per_ciphertext.max(1);
        let mut fresh = Vec::with_capacity(count);
        for _ in 0..count {
            let (ciphertext, base) = self.choose_ciphertext();
            let nanos: u128 = (0..repeats)
                .map(|_| self.oracle.decrypt_with_timing(&ciphertext).as_nanos())
                .sum();
            fresh.push((base, nanos));
        }
        self.measurements += (count * repeats) as u64;

        let montgomery = &self.montgomery;
        let known = self.prefix.bits().get(1..).unwrap_or_default();
        let replayed: Vec<Sample> = fresh
            .into_par_iter()
            .map(|(base, nanos)| {
                // After the leading one bit the accumulator is the base itself.
                let mut state = base.clone();
                for &bit in known {
                    state = step(montgomery, &state, &base, bit);
                }
                Sample { base, state, nanos }
            })
            .collect();
        self.samples.extend(replayed);
    }

    fn decide_bit(&mut self, position: usize) -> Result<bool> {
        let mut retries = 0;
        loop {
            let (z0, z1) = self.z_scores();
            debug!(
                "bit {}: z(0) = {:.3}, z(1) = {:.3} over {} ciphertexts",
                position,
                z0 as f64 / 1000.0,
                z1 as f64 / 1000.0,
                self.samples.len()
            );
            if z1.abs_diff(z0) >= self.config.decision_margin {
                return Ok(z1 > z0);
            }
            if retries >= self.config.max_retries {
                return Err(Error::AmbiguousBitRecovery {
                    bit_position: position,
                    retries,
                    prefix: self.prefix.clone(),
                });
            }
            retries += 1;
            warn!(
                "bit {} is unclear, measuring {} more ciphertexts (retry {} of {})",
                position, self.config.ciphertexts, retries, self.config.max_retries
            );
            self.measure(self.config.ciphertexts);
        }
    }

    fn decide_last_bit(&self) -> bool {
        let upper = self.prefix.to_biguint() << 1u32;
        let candidates = [&upper + 1u32, upper];
        for (candidate, bit) in candidates.iter().zip([true, false]) {
            if self.verifies(candidate) {
                debug!("last bit {} confirmed against the public key", bit as u8);
                return bit;
            }
        }

        let (_, z1) = self.z_scores();
        let bit = z1 > (self.config.decision_margin / 2) as i64;
        warn!(
            "neither final exponent candidate matches the public key; guessing {} from timing",
            bit as u8
        );
        bit
    }

    fn verifies(&self, exponent: &BigUint) -> bool {
        let n = &self.public.n;
        CHECK_MESSAGES.iter().all(|&m| {
            let m = BigUint::from(m) % n;
            modpow(&self.public.encrypt(&m), exponent, n) == m
        })
    }

    /// Separation of the timings under the bit-0 and bit-1 hypotheses, as
    /// t-scores in thousandths.
    fn z_scores(&self) -> (i64, i64) {
        let montgomery = &self.montgomery;
        let events: Vec<(bool, bool)> = self
            .samples
            .par_iter()
            .map(|sample| {
                let (squared, _) = montgomery.mul(&sample.state, &sample.state);
                let (_, multiply_extra) = montgomery.mul(&squared, &sample.base);
                let (_, square_extra) = montgomery.mul(&squared, &squared);
                (square_extra, multiply_extra)
            })
            .collect();

        let z0 = separation(&self.samples, events.iter().map(|&(h0, _)| h0));
        let z1 = separation(&self.samples, events.iter().map(|&(_, h1)| h1));
        (z0, z1)
    }

    /// Replay one more exponent bit for every sample.
    fn advance(&mut self, bit: bool) {
        let montgomery = &self.montgomery;
        self.samples.par_iter_mut().for_each(|sample| {
            sample.state = step(montgomery, &sample.state, &sample.base, bit);
        });
    }
}

fn step(montgomery: &Montgomery, state: &BigUint, base: &BigUint, bit: bool) -> BigUint {
    let (squared, _) = montgomery.mul(state, state);
    if bit {
        montgomery.mul(&squared, base).0
    } else {
        squared
    }
}

/// Student's t-score (times 1000, pooled variance) for the difference in mean
/// time between samples where the event happens and samples where it does
/// not.
///
/// With sums S_e, S_n over the two groups of sizes n_e, n_n, M = n_e + n_n,
/// and W = n_e * n_n * sum(x^2) - n_n * S_e^2 - n_e * S_n^2:
///
///     t = (S_e * n_n - S_n * n_e) / sqrt(M * W / (M - 2))
fn separation(samples: &[Sample], events: impl Iterator<Item = bool>) -> i64 {
    let (mut sum_e, mut sum_n, mut n_e, mut n_n) = (0u128, 0u128, 0u128, 0u128);
    let mut sum_sq = BigInt::zero();
    for (sample, event) in samples.iter().zip(events) {
        if event {
            sum_e += sample.nanos;
            n_e += 1;
        } else {
            sum_n += sample.nanos;
            n_n += 1;
        }
        sum_sq += BigInt::from(sample.nanos) * sample.nanos;
    }
    if n_e == 0 || n_n == 0 || n_e + n_n <= 2 {
        return 0;
    }

    let (sum_e, sum_n) = (BigInt::from(sum_e), BigInt::from(sum_n));
    let within = BigInt::from(n_e) * n_n * sum_sq
        - BigInt::from(n_n) * &sum_e * &sum_e
        - BigInt::from(n_e) * &sum_n * &sum_n;
    let m = n_e + n_n;
    // Scaled by 10^6 so the integer square root keeps three decimals.
    let denominator_sq = within * m * 1_000_000u64 / (m - 2);
    let denominator = match denominator_sq.to_biguint() {
        Some(d) if !d.is_zero() => BigInt::from(d.sqrt()),
        _ => return 0,
    };

    let numerator = sum_e * n_n - sum_n * n_e;
    let z: BigInt = numerator * 1_000_000u64 / &denominator;
    z.clamp(BigInt::from(i64::MIN), BigInt::from(i64::MAX))
        .to_i64()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{generate_key_pair, KeyMaterial, SimulatedTimingOracle, TimingProfile};

    use rstest::rstest;

    fn keys(seed: u8) -> KeyMaterial {
        let mut rng = StdRng::from_seed([seed; 32]);
        generate_key_pair(64, &mut rng).unwrap()
    }

    /// A decryption that takes the same time for every input.
    struct ConstantTime;

    impl TimingOracle for ConstantTime {
        fn decrypt_with_timing(&mut self, _: &BigUint) -> Duration {
            Duration::from_micros(5)
        }
    }

    #[rstest]
    #[case(61)]
    #[case(62)]
    #[case(63)]
    fn recovers_exponent_under_noiseless_oracle(#[case] seed: u8) {
        let keys = keys(seed);
        let mut oracle = SimulatedTimingOracle::new(&keys, TimingProfile::default(), 0).unwrap();

        let recovered = timing_attack(
            keys.public(),
            keys.d.bits(),
            &mut oracle,
            &TimingAttackConfig::default(),
        )
        .unwrap();

        assert!(recovered.complete);
        assert_eq!(recovered.exponent, keys.d);
        assert_eq!(recovered.prefix.len() as u64, keys.d.bits());
    }

    #[test]
    fn recovers_exponent_despite_jitter() {
        let keys = keys(64);
        let profile = TimingProfile {
            jitter: Some(Duration::from_nanos(200)),
            ..TimingProfile::default()
        };
        let mut oracle = SimulatedTimingOracle::new(&keys, profile, 7).unwrap();

        let recovered = timing_attack(
            keys.public(),
            keys.d.bits(),
            &mut oracle,
            &TimingAttackConfig::default(),
        )
        .unwrap();

        assert_eq!(recovered.exponent, keys.d);
    }

    #[test]
    fn attack_is_deterministic() {
        let keys = keys(65);
        let config = TimingAttackConfig {
            max_bits: Some(24),
            ..TimingAttackConfig::default()
        };
        let run = || {
            let mut oracle =
                SimulatedTimingOracle::new(&keys, TimingProfile::default(), 0).unwrap();
            timing_attack(keys.public(), keys.d.bits(), &mut oracle, &config).unwrap()
        };

        let first = run();
        let second = run();

        assert_eq!(first.prefix, second.prefix);
        assert_eq!(first.measurements, second.measurements);
        assert_eq!(first.exponent, &keys.d >> (keys.d.bits() - 24));
    }

    #[test]
    fn chosen_ciphertexts_have_montgomery_forms_just_below_the_modulus() {
        let keys = keys(68);
        let n = keys.n().clone();
        let floor = &n - (&n >> BASE_BAND_SHIFT) - 1u32;
        let mut oracle = ConstantTime;
        let mut attack =
            TimingAttack::new(keys.public(), &mut oracle, TimingAttackConfig::default()).unwrap();

        for _ in 0..200 {
            let (ciphertext, base) = attack.choose_ciphertext();

            assert!(ciphertext < n);
            assert!(base >= floor && base < n, "base = {base}");
            assert_eq!(attack.montgomery.to_montgomery(&ciphertext), base);
        }
    }

    #[test]
    fn max_bits_returns_the_top_of_the_exponent() {
        let keys = keys(66);
        let config = TimingAttackConfig {
            max_bits: Some(16),
            ..TimingAttackConfig::default()
        };
        let mut oracle = SimulatedTimingOracle::new(&keys, TimingProfile::default(), 0).unwrap();

        let recovered = timing_attack(keys.public(), keys.d.bits(), &mut oracle, &config).unwrap();

        assert!(!recovered.complete);
        assert_eq!(recovered.prefix.len(), 16);
        assert_eq!(recovered.exponent, &keys.d >> (keys.d.bits() - 16));
    }

    #[test]
    fn constant_time_decryption_is_ambiguous() {
        let keys = keys(67);
        let config = TimingAttackConfig {
            ciphertexts: 200,
            max_retries: 3,
            ..TimingAttackConfig::default()
        };

        let result = timing_attack(keys.public(), keys.d.bits(), &mut ConstantTime, &config);

        match result {
            Err(Error::AmbiguousBitRecovery {
                bit_position,
                retries,
                prefix,
            }) => {
                assert_eq!(bit_position, 1);
                assert_eq!(retries, 3);
                assert_eq!(prefix.bits(), [true]);
            }
            other => panic!("expected AmbiguousBitRecovery, got {:?}", other),
        }
    }

    #[test]
    fn separation_is_zero_without_variance_or_without_a_split() {
        let sample = |nanos| Sample {
            base: BigUint::zero(),
            state: BigUint::zero(),
            nanos,
        };
        let flat: Vec<Sample> = (0..10).map(|_| sample(100)).collect();
        let varied: Vec<Sample> = (0..10).map(|i| sample(100 + i)).collect();

        assert_eq!(separation(&flat, (0..10).map(|i| i % 2 == 0)), 0);
        assert_eq!(separation(&varied, (0..10).map(|_| true)), 0);
    }

    #[test]
    fn separation_is_positive_when_events_are_slower() {
        let samples: Vec<Sample> = (0..100u128)
            .map(|i| Sample {
                base: BigUint::zero(),
                state: BigUint::zero(),
                nanos: if i % 2 == 0 { 1100 + i % 7 } else { 1000 + i % 5 },
            })
            .collect();

        let z = separation(&samples, (0..100).map(|i| i % 2 == 0));

        assert!(z > 10_000, "z = {z}");
    }

    #[test]
    fn separation_uses_the_pooled_within_group_variance() {
        // Means 5 and 2, pooled variance 2, so t = 3 / sqrt(2) = 2.121.
        let samples: Vec<Sample> = [4u128, 6, 1, 3]
            .into_iter()
            .map(|nanos| Sample {
                base: BigUint::zero(),
                state: BigUint::zero(),
                nanos,
            })
            .collect();

        let z = separation(&samples, [true, true, false, false].into_iter());

        assert_eq!(z, 2121);
        assert_eq!(separation(&samples, [false, false, true, true].into_iter()), -2121);
    }

    #[rstest]
    #[case(vec![], BigUint::zero(), "<none>")]
    #[case(vec![true], BigUint::from(1u32), "1")]
    #[case(vec![true, false, true, true], BigUint::from(0b1011u32), "1011")]
    fn prefix_reads_as_big_endian_binary(
        #[case] bits: Vec<bool>,
        #[case] value: BigUint,
        #[case] shown: &str,
    ) {
        let prefix = ExponentPrefix::from_bits(bits);

        assert_eq!(prefix.to_biguint(), value);
        assert_eq!(prefix.to_string(), shown);
    }
}
