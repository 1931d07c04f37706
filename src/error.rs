// Errors raised by the attacks and their supporting RSA machinery.

use crate::{ExponentPrefix, IntervalSet};

use num_bigint::BigUint;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{value} is not invertible modulo {modulus}")]
    NotInvertible { value: BigUint, modulus: BigUint },

    #[error(
        "padding oracle exhausted after {queries} queries in {rounds} rounds \
        with {} interval(s) remaining",
        .intervals.len()
    )]
    OracleExhausted {
        queries: u64,
        rounds: u64,
        intervals: IntervalSet,
    },

    #[error("padding oracle unavailable after {failures} consecutive failed queries: {reason}")]
    OracleUnavailable { failures: u32, reason: String },

    #[error(
        "could not separate timing hypotheses for exponent bit {bit_position} \
        after {retries} retries (recovered so far: {prefix})"
    )]
    AmbiguousBitRecovery {
        bit_position: usize,
        retries: u32,
        prefix: ExponentPrefix,
    },

    #[error("fault did not expose a factor of the modulus (gcd = {gcd})")]
    FaultDidNotExposeFactor { gcd: BigUint },

    #[error("no {bits}-bit prime found after {attempts} attempts")]
    KeyGeneration { bits: u64, attempts: u32 },

    #[error("integer needs {needed} bytes but the requested length is {length}")]
    Length { needed: usize, length: usize },

    #[error("message of {actual} bytes is longer than the {max} bytes the key can pad")]
    MessageTooLong { max: usize, actual: usize },

    #[error("block is not PKCS#1 v1.5 encryption padded")]
    MalformedPadding,
}
