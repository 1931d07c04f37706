// Textbook RSA key material and the raw public/private key operations the
// vulnerable oracles are built on.

use crate::{generate_prime, lcm, modinv, modpow, Error, Result};

use num_bigint::BigUint;
use num_traits::One;
use rand::Rng;

pub const PUBLIC_EXPONENT: u64 = 65537;

/// Rejected key candidates tolerated before key generation gives up.
const MAX_KEY_ATTEMPTS: u32 = 100;

/// The part of a key pair an attacker is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub n: BigUint,
    pub e: BigUint,
}

impl PublicKey {
    pub fn new(n: BigUint, e: BigUint) -> Self {
        Self { n, e }
    }

    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// Length of the modulus in bytes, `k` in PKCS#1.
    pub fn byte_len(&self) -> usize {
        self.n.bits().div_ceil(8) as usize
    }

    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        modpow(m, &self.e, &self.n)
    }
}

/// A complete RSA key pair, including the factorisation of the modulus and
/// the precomputed CRT parameters.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    public: PublicKey,
    pub d: BigUint,
    pub p: BigUint,
    pub q: BigUint,
    pub dp: BigUint,
    pub dq: BigUint,
    pub q_inv: BigUint,
}

impl KeyMaterial {
    /// Build key material from two distinct primes.
    pub fn from_primes(p: BigUint, q: BigUint, e: BigUint) -> Result<Self> {
        let one = BigUint::one();
        let n = &p * &q;
        let lambda = lcm(&(&p - &one), &(&q - &one));
        let d = modinv(&e, &lambda)?;
        let dp = &d % (&p - &one);
        let dq = &d % (&q - &one);
        let q_inv = modinv(&q, &p)?;
        Ok(Self {
            public: PublicKey::new(n, e),
            d,
            p,
            q,
            dp,
            dq,
            q_inv,
        })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn n(&self) -> &BigUint {
        &self.public.n
    }

    pub fn e(&self) -> &BigUint {
        &self.public.e
    }

    pub fn encrypt(&self, m: &BigUint) -> BigUint {
        self.public.encrypt(m)
    }

    /// `c ** d mod n`, without CRT.
    pub fn decrypt(&self, c: &BigUint) -> BigUint {
        modpow(c, &self.d, self.n())
    }

    /// `c ** d mod n` via the Chinese Remainder Theorem, returning the
    /// recombined result.
    pub fn decrypt_crt(&self, c: &BigUint) -> BigUint {
        let (m_p, m_q) = self.crt_branches(c);
        self.crt_combine(&m_p, &m_q)
    }

    /// The two half-size exponentiations `c ** dp mod p` and `c ** dq mod q`.
    pub fn crt_branches(&self, c: &BigUint) -> (BigUint, BigUint) {
        let m_p = modpow(c, &self.dp, &self.p);
        let m_q = modpow(c, &self.dq, &self.q);
        (m_p, m_q)
    }

    /// Garner recombination: `m = m_q + q * (q_inv * (m_p - m_q) mod p)`.
    pub fn crt_combine(&self, m_p: &BigUint, m_q: &BigUint) -> BigUint {
        let m_q_mod_p = m_q % &self.p;
        let difference = if m_p >= &m_q_mod_p {
            m_p - &m_q_mod_p
        } else {
            m_p + &self.p - &m_q_mod_p
        };
        let h = (&self.q_inv * difference) % &self.p;
        (m_q + h * &self.q) % self.n()
    }
}

/// Generate an RSA key pair with an `n_bits`-bit modulus and `e = 65537`.
pub fn generate_key_pair<R: Rng + ?Sized>(n_bits: u64, rng: &mut R) -> Result<KeyMaterial> {
    let e = BigUint::from(PUBLIC_EXPONENT);

    // Loop until we find distinct primes such that gcd(e, lambda) = 1.
    for _ in 0..MAX_KEY_ATTEMPTS {
        // Key size usually refers to the size of n (which is p*q), so get
        // primes each with half as many bits as we need.
        let p = generate_prime(n_bits / 2, rng)?;
        let q = generate_prime(n_bits - n_bits / 2, rng)?;
        if p == q {
            continue;
        }

        match KeyMaterial::from_primes(p, q, e.clone()) {
            Ok(keys) => return Ok(keys),
            Err(Error::NotInvertible { .. }) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(Error::KeyGeneration {
        bits: n_bits,
        attempts: MAX_KEY_ATTEMPTS,
    })
}
