// Bellcore fault attack on CRT RSA: factor the modulus from one private-key
// result whose mod-p half was corrupted.
//
// With CRT the result s is assembled from s mod p and s mod q. If a fault
// corrupts only the mod-p branch, the faulty result s' still agrees with s
// modulo q but not modulo p, so
//
//                        gcd(s - s' mod n, n) = q.
//
// Lenstra's refinement needs no correct result at all: s'^e agrees with the
// message modulo q only, so gcd(s'^e - m mod n, n) = q as well.

use crate::{gcd, Error, FaultOracle, PublicKey, Result};

use log::{debug, info};
use num_bigint::BigUint;
use num_traits::One;

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Correct and faulty results of the same private-key operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultyCiphertextPair {
    pub correct: BigUint,
    pub faulty: BigUint,
}

/// The prime factors of a modulus, smaller first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredFactors {
    pub p: BigUint,
    pub q: BigUint,
}

impl RecoveredFactors {
    fn new(a: BigUint, b: BigUint) -> Self {
        if a <= b {
            Self { p: a, q: b }
        } else {
            Self { p: b, q: a }
        }
    }
}

impl fmt::Display for RecoveredFactors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p = {}, q = {}", self.p, self.q)
    }
}

/// Factor the modulus from a correct and a faulty result for the same input.
pub fn recover_factors(
    public: &PublicKey,
    pair: &FaultyCiphertextPair,
) -> Result<RecoveredFactors> {
    let n = &public.n;
    let difference = sub_mod(&pair.correct, &pair.faulty, n);
    split_modulus(n, &difference)
}

/// Factor the modulus from a single faulty result and the message that was
/// signed.
pub fn recover_factors_from_message(
    public: &PublicKey,
    message: &BigUint,
    faulty: &BigUint,
) -> Result<RecoveredFactors> {
    let n = &public.n;
    let difference = sub_mod(&public.encrypt(faulty), message, n);
    split_modulus(n, &difference)
}

/// `(a - b) mod n`.
fn sub_mod(a: &BigUint, b: &BigUint, n: &BigUint) -> BigUint {
    let (a, b) = (a % n, b % n);
    if a >= b {
        a - b
    } else {
        a + n - b
    }
}

fn split_modulus(n: &BigUint, difference: &BigUint) -> Result<RecoveredFactors> {
    let divisor = gcd(difference, n);
    if divisor.is_one() || &divisor >= n {
        return Err(Error::FaultDidNotExposeFactor { gcd: divisor });
    }

    let cofactor = n / &divisor;
    if &divisor * &cofactor != *n {
        return Err(Error::FaultDidNotExposeFactor { gcd: divisor });
    }
    debug!("fault exposed factor {}", divisor);
    Ok(RecoveredFactors::new(divisor, cofactor))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtFaultOutcome {
    pub pair: FaultyCiphertextPair,
    pub factors: RecoveredFactors,
    pub queries: u64,
    pub elapsed: Duration,
}

/// Request a correct and a faulty result for `message` from the oracle and
/// factor the modulus with them.
pub fn crt_fault_attack(
    public: &PublicKey,
    oracle: &impl FaultOracle,
    message: &BigUint,
) -> Result<CrtFaultOutcome> {
    CrtFaultAttack::new(public, oracle).run(message)
}

pub struct CrtFaultAttack<'a, O: FaultOracle> {
    public: &'a PublicKey,
    oracle: &'a O,
}

impl<'a, O: FaultOracle> CrtFaultAttack<'a, O> {
    pub fn new(public: &'a PublicKey, oracle: &'a O) -> Self {
        Self { public, oracle }
    }

    pub fn run(&self, message: &BigUint) -> Result<CrtFaultOutcome> {
        let started = Instant::now();
        info!(
            "starting CRT fault attack on a {}-bit modulus",
            self.public.bits()
        );

        let pair = FaultyCiphertextPair {
            correct: self.oracle.sign_or_decrypt(message, false),
            faulty: self.oracle.sign_or_decrypt(message, true),
        };
        let factors = recover_factors(self.public, &pair)?;

        let elapsed = started.elapsed();
        info!("factored the modulus from one fault ({:?})", elapsed);
        Ok(CrtFaultOutcome {
            pair,
            factors,
            queries: 2,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{generate_key_pair, CrtFaultOracle, FaultMode, KeyMaterial};

    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    fn expected_factors(keys: &KeyMaterial) -> RecoveredFactors {
        RecoveredFactors::new(keys.p.clone(), keys.q.clone())
    }

    /// Answers faithfully whether or not a fault was requested.
    struct NoFault(KeyMaterial);

    impl FaultOracle for NoFault {
        fn sign_or_decrypt(&self, message: &BigUint, _: bool) -> BigUint {
            self.0.decrypt_crt(message)
        }
    }

    #[rstest]
    #[case(FaultMode::FlipLowBit, 256)]
    #[case(FaultMode::Zero, 256)]
    #[case(FaultMode::FlipLowBit, 512)]
    #[case(FaultMode::Zero, 1024)]
    fn single_fault_factors_the_modulus(#[case] mode: FaultMode, #[case] bits: u64) {
        let mut rng = StdRng::from_seed([71; 32]);
        let keys = generate_key_pair(bits, &mut rng).unwrap();
        let oracle = CrtFaultOracle::new(keys.clone(), mode);
        let message = BigUint::from_bytes_be(b"sign me");

        let outcome = crt_fault_attack(keys.public(), &oracle, &message).unwrap();

        assert_eq!(outcome.factors, expected_factors(&keys));
        assert_eq!(&outcome.factors.p * &outcome.factors.q, *keys.n());
        assert_eq!(outcome.queries, 2);
    }

    #[test]
    fn recovery_from_an_explicit_pair() {
        let mut rng = StdRng::from_seed([72; 32]);
        let keys = generate_key_pair(256, &mut rng).unwrap();
        let oracle = CrtFaultOracle::new(keys.clone(), FaultMode::default());
        let message = BigUint::from(0xfeed_u64);
        // Order does not matter: the gcd is the same either way round.
        let pair = FaultyCiphertextPair {
            correct: oracle.sign_or_decrypt(&message, true),
            faulty: oracle.sign_or_decrypt(&message, false),
        };

        let factors = recover_factors(keys.public(), &pair).unwrap();

        assert_eq!(factors, expected_factors(&keys));
    }

    #[rstest]
    #[case(FaultMode::FlipLowBit)]
    #[case(FaultMode::Zero)]
    fn message_and_faulty_result_alone_suffice(#[case] mode: FaultMode) {
        let mut rng = StdRng::from_seed([73; 32]);
        let keys = generate_key_pair(256, &mut rng).unwrap();
        let oracle = CrtFaultOracle::new(keys.clone(), mode);
        let message = BigUint::from_bytes_be(b"lenstra");

        let faulty = oracle.sign_or_decrypt(&message, true);
        let factors = recover_factors_from_message(keys.public(), &message, &faulty).unwrap();

        assert_eq!(factors, expected_factors(&keys));
    }

    #[test]
    fn identical_results_do_not_expose_a_factor() {
        let mut rng = StdRng::from_seed([74; 32]);
        let keys = generate_key_pair(256, &mut rng).unwrap();
        let oracle = NoFault(keys.clone());

        let result = crt_fault_attack(keys.public(), &oracle, &BigUint::from(99u32));

        match result {
            Err(Error::FaultDidNotExposeFactor { gcd }) => assert_eq!(gcd, *keys.n()),
            other => panic!("expected FaultDidNotExposeFactor, got {:?}", other),
        }
    }

    #[test]
    fn unrelated_results_do_not_expose_a_factor() {
        let mut rng = StdRng::from_seed([75; 32]);
        let keys = generate_key_pair(256, &mut rng).unwrap();
        let pair = FaultyCiphertextPair {
            correct: BigUint::from(5u32),
            faulty: BigUint::from(4u32),
        };

        let result = recover_factors(keys.public(), &pair);

        assert!(matches!(
            result,
            Err(Error::FaultDidNotExposeFactor { gcd }) if gcd == BigUint::one()
        ));
    }

    #[test]
    fn attack_is_deterministic() {
        let mut rng = StdRng::from_seed([76; 32]);
        let keys = generate_key_pair(256, &mut rng).unwrap();
        let oracle = CrtFaultOracle::new(keys.clone(), FaultMode::FlipLowBit);
        let message = BigUint::from(31337u32);
        let attack = CrtFaultAttack::new(keys.public(), &oracle);

        let first = attack.run(&message).unwrap();
        let second = attack.run(&message).unwrap();

        assert_eq!(first.factors, second.factors);
        assert_eq!(first.pair, second.pair);
    }
}
