// Montgomery multiplication with the data-dependent final subtraction that
// makes naive square-and-multiply leak exponent bits through timing.
//
// For an odd modulus n and R = 2^k > n, the Montgomery product of a and b is
//
//                        a * b * R^-1 mod n.
//
// It is computed without any division by n: t = a * b, m = t * n' mod R and
// u = (t + m * n) / R, where n' = -n^-1 mod R. For a, b < n we have u < 2n,
// so one conditional subtraction brings u into range. Whether that "extra
// reduction" happens depends on the operands, and it costs time. An attacker
// who knows n and has guessed the exponent bits processed so far can
// reproduce every intermediate value, and hence predict exactly which
// multiplications need the extra reduction.

use crate::{modinv, Result};

use num_bigint::BigUint;
use num_traits::One;

/// Which half of a square-and-multiply step an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Square,
    Multiply,
}

#[derive(Debug, Clone)]
pub struct Montgomery {
    n: BigUint,
    n_prime: BigUint,
    r_bits: u64,
    r_mask: BigUint,
}

impl Montgomery {
    /// Fails with `NotInvertible` if `n` is even.
    pub fn new(n: &BigUint) -> Result<Self> {
        let r_bits = n.bits();
        let r = BigUint::one() << r_bits;
        let n_inv = modinv(n, &r)?;
        let n_prime = &r - n_inv;
        Ok(Self {
            n: n.clone(),
            n_prime,
            r_bits,
            r_mask: r - 1u32,
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// `a * b * R^-1 mod n`, and whether the final subtraction was needed.
    pub fn mul(&self, a: &BigUint, b: &BigUint) -> (BigUint, bool) {
        let t = a * b;
        let m = ((&t & &self.r_mask) * &self.n_prime) & &self.r_mask;
        let u = (t + m * &self.n) >> self.r_bits;
        if u >= self.n {
            (u - &self.n, true)
        } else {
            (u, false)
        }
    }

    pub fn to_montgomery(&self, x: &BigUint) -> BigUint {
        (x << self.r_bits) % &self.n
    }

    pub fn from_montgomery(&self, x: &BigUint) -> BigUint {
        self.mul(x, &BigUint::one()).0
    }

    /// `R mod n`, the Montgomery form of one.
    pub fn one(&self) -> BigUint {
        self.to_montgomery(&BigUint::one())
    }

    /// Left-to-right square-and-multiply, reporting every operation and
    /// whether it needed an extra reduction to `observe`.
    pub fn pow_observed(
        &self,
        base: &BigUint,
        exponent: &BigUint,
        mut observe: impl FnMut(Step, bool),
    ) -> BigUint {
        let base = self.to_montgomery(base);
        let mut acc = self.one();
        for i in (0..exponent.bits()).rev() {
            let (squared, extra) = self.mul(&acc, &acc);
            observe(Step::Square, extra);
            acc = squared;
            if exponent.bit(i) {
                let (product, extra) = self.mul(&acc, &base);
                observe(Step::Multiply, extra);
                acc = product;
            }
        }
        self.from_montgomery(&acc)
    }

    pub fn pow(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        self.pow_observed(base, exponent, |_, _| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{modpow, Error};

    use rstest::rstest;

    fn modulus() -> BigUint {
        BigUint::parse_bytes(b"c5a0f3e1d2b4968770a3c1e5f9d7b3a1", 16).unwrap()
    }

    #[rstest]
    #[case(0u64, 0u64)]
    #[case(1u64, 1u64)]
    #[case(123456789u64, 987654321u64)]
    #[case(u64::MAX, u64::MAX - 7)]
    fn mul_is_product_in_montgomery_form(#[case] a: u64, #[case] b: u64) {
        let n = modulus();
        let mont = Montgomery::new(&n).unwrap();
        let (a, b) = (BigUint::from(a), BigUint::from(b));

        let (product, _) = mont.mul(&mont.to_montgomery(&a), &mont.to_montgomery(&b));

        assert_eq!(mont.from_montgomery(&product), &a * &b % &n);
    }

    #[test]
    fn pow_agrees_with_modpow() {
        let n = modulus();
        let mont = Montgomery::new(&n).unwrap();
        let base = BigUint::parse_bytes(b"0123456789abcdef0123456789", 16).unwrap();
        let exponent = BigUint::parse_bytes(b"b3c1f00d", 16).unwrap();

        assert_eq!(mont.pow(&base, &exponent), modpow(&base, &exponent, &n));
    }

    #[test]
    fn pow_observed_reports_a_multiply_for_every_set_bit() {
        let mont = Montgomery::new(&modulus()).unwrap();
        let exponent = BigUint::from(0b1011_0110u32);
        let mut steps = Vec::new();

        mont.pow_observed(&BigUint::from(3u32), &exponent, |step, _| steps.push(step));

        let squares = steps.iter().filter(|&&s| s == Step::Square).count();
        let multiplies = steps.iter().filter(|&&s| s == Step::Multiply).count();
        assert_eq!(squares, 8);
        assert_eq!(multiplies, 5);
        assert_eq!(steps[..2], [Step::Square, Step::Multiply]);
    }

    #[test]
    fn some_but_not_all_products_need_an_extra_reduction() {
        let n = modulus();
        let mont = Montgomery::new(&n).unwrap();
        let extras = (1u64..500)
            .map(|x| {
                let a = mont.to_montgomery(&BigUint::from(x.wrapping_mul(0x9e37_79b9_7f4a_7c15)));
                mont.mul(&a, &a).1
            })
            .filter(|&extra| extra)
            .count();

        assert!(extras > 0);
        assert!(extras < 499);
    }

    #[test]
    fn even_modulus_is_rejected() {
        let result = Montgomery::new(&BigUint::from(100u32));

        assert!(matches!(result, Err(Error::NotInvertible { .. })));
    }
}
