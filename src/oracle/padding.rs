// A local PKCS#1 v1.5 padding oracle: it decrypts with the private key and
// reports nothing but whether the result is conforming.

use super::PaddingOracle;
use crate::{i2osp, pkcs1_conforming, KeyMaterial, PaddingCheck, PublicKey};

use num_bigint::BigUint;

#[derive(Debug, Clone)]
pub struct Pkcs1PaddingOracle {
    keys: KeyMaterial,
    check: PaddingCheck,
}

impl Pkcs1PaddingOracle {
    pub fn new(keys: KeyMaterial, check: PaddingCheck) -> Self {
        Self { keys, check }
    }

    pub fn public(&self) -> &PublicKey {
        self.keys.public()
    }
}

impl PaddingOracle for Pkcs1PaddingOracle {
    fn is_valid_padding(&self, ciphertext: &BigUint) -> bool {
        if ciphertext >= self.keys.n() {
            return false;
        }
        let m = self.keys.decrypt_crt(ciphertext);
        match i2osp(&m, self.keys.public().byte_len()) {
            Ok(block) => pkcs1_conforming(&block, self.check),
            Err(_) => false,
        }
    }
}
