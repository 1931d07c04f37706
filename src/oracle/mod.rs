// The three side channels the attacks consume, and deliberately vulnerable
// implementations of each.
mod fault;
mod padding;
mod remote;
mod timing;

pub use fault::{CrtFaultOracle, FaultMode};
pub use padding::Pkcs1PaddingOracle;
pub use remote::{padding_oracle_router, spawn_padding_oracle_server, RemotePaddingOracle};
pub use timing::{SimulatedTimingOracle, TimingProfile, WallClockTimingOracle};

use crate::Result;

use num_bigint::BigUint;

use std::time::Duration;

/// Leaks whether a ciphertext decrypts to a PKCS#1 v1.5 conforming block.
pub trait PaddingOracle {
    fn is_valid_padding(&self, ciphertext: &BigUint) -> bool;

    /// Checked after every query. An oracle that can no longer answer
    /// (a server that stopped responding) says so here, and the attack stops
    /// instead of reading its silence as invalid padding.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }
}

impl<F> PaddingOracle for F
where
    F: Fn(&BigUint) -> bool,
{
    fn is_valid_padding(&self, ciphertext: &BigUint) -> bool {
        self(ciphertext)
    }
}

/// Leaks how long a private-key operation on a ciphertext took.
pub trait TimingOracle {
    fn decrypt_with_timing(&mut self, ciphertext: &BigUint) -> Duration;
}

/// Performs the CRT private-key operation on a message, optionally corrupting
/// one of the two CRT branches.
pub trait FaultOracle {
    fn sign_or_decrypt(&self, message: &BigUint, inject_fault: bool) -> BigUint;
}
