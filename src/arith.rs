// Exact modular arithmetic shared by the key generation, the oracles and all
// three attacks.

use crate::{Error, Result};

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};

/// Compute `base ** exponent mod modulus` by left-to-right repeated squaring.
///
/// Panics if `modulus` is zero.
pub fn modpow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    assert!(!modulus.is_zero(), "modpow with a zero modulus");
    if modulus.is_one() {
        return BigUint::zero();
    }

    let base = base % modulus;
    let mut result = BigUint::one();
    for i in (0..exponent.bits()).rev() {
        result = &result * &result % modulus;
        if exponent.bit(i) {
            result = &result * &base % modulus;
        }
    }
    result
}

/// The unique `x` in `[0, m)` with `a * x = 1 (mod m)`.
pub fn modinv(a: &BigUint, m: &BigUint) -> Result<BigUint> {
    let not_invertible = || Error::NotInvertible {
        value: a.clone(),
        modulus: m.clone(),
    };
    if m.is_zero() {
        return Err(not_invertible());
    }

    // Extended Euclid, tracking only the coefficient of `a`.
    let modulus = BigInt::from(m.clone());
    let (mut old_r, mut r) = (BigInt::from(a % m), modulus.clone());
    let (mut old_x, mut x) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_x = &old_x - &quotient * &x;
        old_x = std::mem::replace(&mut x, next_x);
    }

    if !old_r.is_one() {
        return Err(not_invertible());
    }

    let inverse = ((old_x % &modulus) + &modulus) % &modulus;
    match inverse.to_biguint() {
        Some(inverse) => Ok(inverse),
        None => Err(not_invertible()),
    }
}

pub fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    a.gcd(b)
}

pub fn lcm(a: &BigUint, b: &BigUint) -> BigUint {
    a.lcm(b)
}

/// `ceil(numerator / denominator)`.
pub fn ceil_div(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    let quotient = numerator / denominator;
    if (&quotient * denominator) == *numerator {
        quotient
    } else {
        quotient + 1u32
    }
}

/// `ceil((a - b) / d)`, clamped at zero when `a < b`.
pub fn ceil_div_diff(a: &BigUint, b: &BigUint, d: &BigUint) -> BigUint {
    let difference = BigInt::from(a.clone()) - BigInt::from(b.clone());
    match difference.to_biguint() {
        Some(difference) => ceil_div(&difference, d),
        None => BigUint::zero(),
    }
}

/// `floor((a - b) / d)`, or `None` when `a < b`.
pub fn floor_div_diff(a: &BigUint, b: &BigUint, d: &BigUint) -> Option<BigUint> {
    if a < b {
        return None;
    }
    Some((a - b) / d)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(4, 13, 497, 445)]
    #[case(2, 0, 7, 1)]
    #[case(0, 5, 7, 0)]
    #[case(99, 29, 133, 92)]
    #[case(12345, 1, 1, 0)]
    fn modpow_matches_known_values(
        #[case] base: u64,
        #[case] exponent: u64,
        #[case] modulus: u64,
        #[case] expected: u64,
    ) {
        let result = modpow(
            &BigUint::from(base),
            &BigUint::from(exponent),
            &BigUint::from(modulus),
        );

        assert_eq!(result, BigUint::from(expected));
    }

    #[test]
    fn modpow_agrees_with_num_bigint_for_large_operands() {
        let base = BigUint::parse_bytes(b"123456789abcdef0fedcba9876543210", 16).unwrap();
        let exponent = BigUint::parse_bytes(b"10001fffffff0000ffff", 16).unwrap();
        let modulus = BigUint::parse_bytes(b"f1e2d3c4b5a6978877665544332211ff", 16).unwrap();

        assert_eq!(
            modpow(&base, &exponent, &modulus),
            base.modpow(&exponent, &modulus)
        );
    }

    #[rstest]
    #[case(3, 11, 4)]
    #[case(17, 3120, 2753)]
    #[case(29, 108, 41)]
    #[case(1, 2, 1)]
    fn modinv_finds_inverse(#[case] a: u64, #[case] m: u64, #[case] expected: u64) {
        let inverse = modinv(&BigUint::from(a), &BigUint::from(m)).unwrap();

        assert_eq!(inverse, BigUint::from(expected));
        assert!((BigUint::from(a) * inverse % m).is_one());
    }

    #[rstest]
    #[case(6, 9)]
    #[case(0, 9)]
    #[case(4, 0)]
    fn modinv_fails_when_not_coprime(#[case] a: u64, #[case] m: u64) {
        let result = modinv(&BigUint::from(a), &BigUint::from(m));

        assert!(matches!(result, Err(Error::NotInvertible { .. })));
    }

    #[rstest]
    #[case(48, 18, 6)]
    #[case(17, 5, 1)]
    #[case(0, 5, 5)]
    #[case(5, 0, 5)]
    #[case(0, 0, 0)]
    fn gcd_is_greatest_common_divisor(#[case] a: u64, #[case] b: u64, #[case] expected: u64) {
        assert_eq!(
            gcd(&BigUint::from(a), &BigUint::from(b)),
            BigUint::from(expected)
        );
    }

    #[test]
    fn lcm_of_coprime_values_is_product() {
        assert_eq!(
            lcm(&BigUint::from(4u32), &BigUint::from(9u32)),
            BigUint::from(36u32)
        );
        assert_eq!(
            lcm(&BigUint::from(4u32), &BigUint::from(6u32)),
            BigUint::from(12u32)
        );
    }

    #[rstest]
    #[case(10, 5, 2)]
    #[case(11, 5, 3)]
    #[case(0, 5, 0)]
    fn ceil_div_rounds_up(#[case] n: u64, #[case] d: u64, #[case] expected: u64) {
        assert_eq!(
            ceil_div(&BigUint::from(n), &BigUint::from(d)),
            BigUint::from(expected)
        );
    }

    #[test]
    fn differences_clamp_when_negative() {
        let three = BigUint::from(3u32);
        let five = BigUint::from(5u32);
        let two = BigUint::from(2u32);

        assert_eq!(ceil_div_diff(&three, &five, &two), BigUint::zero());
        assert_eq!(ceil_div_diff(&five, &two, &two), two);
        assert_eq!(floor_div_diff(&three, &five, &two), None);
        assert_eq!(floor_div_diff(&five, &two, &two), Some(BigUint::one()));
    }
}
