// Functions related to identification and generation of prime numbers.

use crate::{Error, Result};

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;

const MILLER_RABIN_ROUNDS: u32 = 20;

/// Maximum number of random candidates drawn while looking for one prime.
pub const MAX_PRIME_ATTEMPTS: u32 = 10_000;

const SMALL_ODD_PRIMES: [u32; 24] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

pub fn is_likely_prime<R: Rng + ?Sized>(candidate_prime: &BigUint, rng: &mut R) -> bool {
    let two = BigUint::from(2u64);
    if candidate_prime < &two {
        return false;
    }
    if candidate_prime == &two {
        return true;
    }
    if !candidate_prime.bit(0) {
        return false;
    }

    for small_prime in SMALL_ODD_PRIMES {
        let x = BigUint::from(small_prime);
        if candidate_prime == &x {
            return true;
        }
        if (candidate_prime % &x).is_zero() {
            return false;
        }
    }

    miller_rabin(candidate_prime, MILLER_RABIN_ROUNDS, rng)
}

/// Generate a random prime with exactly `n_bits` bits.
///
/// The two most significant bits are always set, so the product of two such
/// primes has exactly `2 * n_bits` bits.
pub fn generate_prime<R: Rng + ?Sized>(n_bits: u64, rng: &mut R) -> Result<BigUint> {
    if n_bits < 3 {
        return Err(Error::KeyGeneration {
            bits: n_bits,
            attempts: 0,
        });
    }

    for _ in 0..MAX_PRIME_ATTEMPTS {
        let mut candidate = rng.gen_biguint(n_bits);
        candidate.set_bit(n_bits - 1, true);
        candidate.set_bit(n_bits - 2, true);
        candidate.set_bit(0, true);
        if is_likely_prime(&candidate, rng) {
            return Ok(candidate);
        }
    }

    Err(Error::KeyGeneration {
        bits: n_bits,
        attempts: MAX_PRIME_ATTEMPTS,
    })
}

fn miller_rabin<R: Rng + ?Sized>(candidate_prime: &BigUint, n_rounds: u32, rng: &mut R) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u64);
    let minus_one = candidate_prime - &one;

    let mut d = minus_one.clone();
    let mut r = 0;
    while !d.bit(0) {
        d >>= 1;
        r += 1;
    }

    'witness: for _ in 0..n_rounds {
        let a = rng.gen_biguint_range(&two, &minus_one);
        let mut x = a.modpow(&d, candidate_prime);
        if x == one || x == minus_one {
            continue;
        }
        for _ in 1..r {
            x = x.modpow(&two, candidate_prime);
            if x == minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use num_traits::Num;
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    #[rstest]
    #[case(BigUint::from(2u64))]
    #[case(BigUint::from(5u64))]
    #[case(BigUint::from(37u64))]
    #[case(BigUint::from(101u64))]
    #[case(BigUint::from(4294967291u64))]
    #[case(BigUint::from_str_radix(
        "122918091607895345462109112013423411099284103879272281586\
        0819946412949055199827238447096054805339148543003066133719\
        9085275880150614723662649630584506204331", 10).unwrap())
    ]
    #[case(BigUint::from_str_radix(
            "ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024\
            e088a67cc74020bbea63b139b22514a08798e3404ddef9519b3cd\
            3a431b302b0a6df25f14374fe1356d6d51c245e485b576625e7ec\
            6f44c42e9a637ed6b0bff5cb6f406b7edee386bfb5a899fa5ae9f\
            24117c4b1fe649286651ece45b3dc2007cb8a163bf0598da48361\
            c55d39a69163fa8fd24cf5f83655d23dca3ad961c62f356208552\
            bb9ed529077096966d670c354e4abc9804f1746c08ca237327fff\
            fffffffffffff", 16).unwrap())]
    fn is_likely_prime_identifies_primes(#[case] prime: BigUint) {
        let mut rng = StdRng::from_seed([101; 32]);

        assert!(is_likely_prime(&prime, &mut rng));
    }

    #[rstest]
    #[case(BigUint::from(0u64))]
    #[case(BigUint::from(1u64))]
    #[case(BigUint::from(4u64))]
    #[case(BigUint::from(1024u64))]
    #[case(BigUint::from(1025u64))]
    #[case(BigUint::from(10403u64))] // 101 * 103
    #[case(BigUint::from(561u64))] // Carmichael number
    #[case(BigUint::from(4294967297u64))] // 641 * 6700417
    fn is_likely_prime_identifies_non_primes(#[case] non_prime: BigUint) {
        let mut rng = StdRng::from_seed([101; 32]);

        assert!(!is_likely_prime(&non_prime, &mut rng));
    }

    #[rstest]
    #[case(16)]
    #[case(32)]
    #[case(128)]
    fn generate_prime_has_requested_bit_length(#[case] n_bits: u64) {
        let mut rng = StdRng::from_seed([7; 32]);

        let prime = generate_prime(n_bits, &mut rng).unwrap();

        assert_eq!(prime.bits(), n_bits);
        assert!(prime.bit(n_bits - 2));
        assert!(is_likely_prime(&prime, &mut rng));
    }

    #[test]
    fn generate_prime_rejects_tiny_bit_lengths() {
        let mut rng = StdRng::from_seed([7; 32]);

        let result = generate_prime(2, &mut rng);

        assert!(matches!(result, Err(Error::KeyGeneration { bits: 2, .. })));
    }
}
