// Integer/octet-string conversions and PKCS#1 v1.5 encryption padding.

use crate::{Error, Result};

use num_bigint::BigUint;
use rand::Rng;

/// Padding string bytes required before the zero separator.
pub const MIN_PADDING_LEN: usize = 8;

/// Bytes of overhead in a padded block: `00 02`, the separator and 8 bytes of
/// padding.
pub const PADDING_OVERHEAD: usize = 3 + MIN_PADDING_LEN;

/// How thoroughly a padding oracle inspects a decrypted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingCheck {
    /// `00 02`, at least 8 nonzero padding bytes and a zero separator.
    #[default]
    Strict,
    /// Only the leading `00 02`.
    PrefixOnly,
}

/// Octet string to integer, big-endian.
pub fn os2ip(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Integer to big-endian octet string of exactly `length` bytes.
pub fn i2osp(x: &BigUint, length: usize) -> Result<Vec<u8>> {
    let bytes = x.to_bytes_be();
    // `to_bytes_be` renders zero as a single zero byte.
    let bytes: &[u8] = if bytes == [0] { &[] } else { &bytes };
    if bytes.len() > length {
        return Err(Error::Length {
            needed: bytes.len(),
            length,
        });
    }

    let mut out = vec![0u8; length - bytes.len()];
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Pad `message` into a `k`-byte block `00 02 PS 00 message` with random
/// nonzero `PS`.
pub fn pkcs1_pad<R: Rng + ?Sized>(message: &[u8], k: usize, rng: &mut R) -> Result<Vec<u8>> {
    let max = k.saturating_sub(PADDING_OVERHEAD);
    if message.len() > max || k < PADDING_OVERHEAD {
        return Err(Error::MessageTooLong {
            max,
            actual: message.len(),
        });
    }

    let padding_len = k - message.len() - 3;
    let mut block = Vec::with_capacity(k);
    block.extend_from_slice(&[0x00, 0x02]);
    block.extend((0..padding_len).map(|_| rng.gen_range(1..=u8::MAX)));
    block.push(0x00);
    block.extend_from_slice(message);
    Ok(block)
}

/// Strip strict PKCS#1 v1.5 encryption padding, returning the message.
pub fn pkcs1_unpad(block: &[u8]) -> Result<Vec<u8>> {
    match separator_index(block) {
        Some(idx) => Ok(block[idx + 1..].to_vec()),
        None => Err(Error::MalformedPadding),
    }
}

pub fn pkcs1_conforming(block: &[u8], check: PaddingCheck) -> bool {
    match check {
        PaddingCheck::Strict => separator_index(block).is_some(),
        PaddingCheck::PrefixOnly => block.len() >= 2 && block[0] == 0x00 && block[1] == 0x02,
    }
}

fn separator_index(block: &[u8]) -> Option<usize> {
    if block.len() < PADDING_OVERHEAD || block[0] != 0x00 || block[1] != 0x02 {
        return None;
    }
    // The first zero after the block type ends the padding string, so the
    // padding is nonzero by construction; it just has to be long enough.
    let idx = block[2..].iter().position(|&b| b == 0x00)? + 2;
    if idx < 2 + MIN_PADDING_LEN {
        return None;
    }
    Some(idx)
}
