// CRT private-key operation with an optional injected fault, modelling a
// voltage or clock glitch during the mod-p half of the computation.

use super::FaultOracle;
use crate::{KeyMaterial, PublicKey};

use num_bigint::BigUint;
use num_traits::Zero;

/// How the mod-p branch result is corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    /// Flip the least significant bit.
    #[default]
    FlipLowBit,
    /// Replace the branch result with zero.
    Zero,
}

#[derive(Debug, Clone)]
pub struct CrtFaultOracle {
    keys: KeyMaterial,
    mode: FaultMode,
}

impl CrtFaultOracle {
    pub fn new(keys: KeyMaterial, mode: FaultMode) -> Self {
        Self { keys, mode }
    }

    pub fn public(&self) -> &PublicKey {
        self.keys.public()
    }

    fn corrupt(&self, m_p: BigUint) -> BigUint {
        match self.mode {
            FaultMode::FlipLowBit => {
                let mut m_p = m_p;
                let low = m_p.bit(0);
                m_p.set_bit(0, !low);
                m_p
            }
            FaultMode::Zero => BigUint::zero(),
        }
    }
}

impl FaultOracle for CrtFaultOracle {
    fn sign_or_decrypt(&self, message: &BigUint, inject_fault: bool) -> BigUint {
        let (m_p, m_q) = self.keys.crt_branches(message);
        let m_p = if inject_fault { self.corrupt(m_p) } else { m_p };
        self.keys.crt_combine(&m_p, &m_q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::generate_key_pair;

    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    #[rstest]
    #[case(FaultMode::FlipLowBit)]
    #[case(FaultMode::Zero)]
    fn fault_only_corrupts_the_mod_p_branch(#[case] mode: FaultMode) {
        let mut rng = StdRng::from_seed([5; 32]);
        let keys = generate_key_pair(128, &mut rng).unwrap();
        let message = BigUint::from(0xc0ffee_u64);
        let oracle = CrtFaultOracle::new(keys.clone(), mode);

        let correct = oracle.sign_or_decrypt(&message, false);
        let faulty = oracle.sign_or_decrypt(&message, true);

        assert_eq!(correct, keys.decrypt(&message));
        assert_ne!(correct, faulty);
        assert_eq!(&correct % &keys.q, &faulty % &keys.q);
        assert_ne!(&correct % &keys.p, &faulty % &keys.p);
    }
}
