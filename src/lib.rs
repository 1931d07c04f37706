mod arith;
mod bleichenbacher;
mod encoding;
mod error;
mod fault;
mod montgomery;
mod oracle;
mod prime;
mod report;
mod rsa;
mod timing;

pub use arith::{ceil_div, ceil_div_diff, floor_div_diff, gcd, lcm, modinv, modpow};
pub use bleichenbacher::{
    bleichenbacher_attack, narrow_intervals, BleichenbacherAttack, BleichenbacherConfig,
    BleichenbacherOutcome, Interval, IntervalSet,
};
pub use encoding::{
    i2osp, os2ip, pkcs1_conforming, pkcs1_pad, pkcs1_unpad, PaddingCheck, MIN_PADDING_LEN,
    PADDING_OVERHEAD,
};
pub use error::{Error, Result};
pub use fault::{
    crt_fault_attack, recover_factors, recover_factors_from_message, CrtFaultAttack,
    CrtFaultOutcome, FaultyCiphertextPair, RecoveredFactors,
};
pub use montgomery::{Montgomery, Step};
pub use oracle::{
    padding_oracle_router, spawn_padding_oracle_server, CrtFaultOracle, FaultMode, FaultOracle,
    PaddingOracle, Pkcs1PaddingOracle, RemotePaddingOracle, SimulatedTimingOracle, TimingOracle,
    TimingProfile, WallClockTimingOracle,
};
pub use prime::{generate_prime, is_likely_prime};
pub use report::AttackReport;
pub use rsa::{generate_key_pair, KeyMaterial, PublicKey, PUBLIC_EXPONENT};
pub use timing::{
    timing_attack, ExponentPrefix, RecoveredExponent, TimingAttack, TimingAttackConfig,
};
