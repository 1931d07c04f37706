// Factor an RSA modulus from one faulty CRT signature.
use rsa_breaker::{
    crt_fault_attack, generate_key_pair, recover_factors_from_message, AttackReport,
    CrtFaultOracle, Error, FaultMode, FaultOracle,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use num_bigint::BigUint;
use rand::{rngs::StdRng, SeedableRng};

use std::{process::ExitCode, time::Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fault {
    /// Flip the low bit of the mod-p result.
    FlipLowBit,
    /// Zero the mod-p result.
    Zero,
}

impl From<Fault> for FaultMode {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::FlipLowBit => FaultMode::FlipLowBit,
            Fault::Zero => FaultMode::Zero,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Bellcore fault attack on CRT RSA", long_about = None)]
struct Args {
    #[arg(long, default_value_t = 1024)]
    bits: u64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Message to sign.
    #[arg(long, default_value = "sign this, please")]
    message: String,
    #[arg(long, value_enum, default_value_t = Fault::FlipLowBit)]
    fault: Fault,
    /// Use only the faulty signature and the message, not a correct
    /// signature.
    #[arg(long)]
    lenstra: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let keys = generate_key_pair(args.bits, &mut rng)
        .with_context(|| format!("generating a {}-bit key", args.bits))?;
    let oracle = CrtFaultOracle::new(keys.clone(), args.fault.into());
    let message = BigUint::from_bytes_be(args.message.as_bytes()) % keys.n();

    let started = Instant::now();
    let (result, queries) = if args.lenstra {
        let faulty = oracle.sign_or_decrypt(&message, true);
        (recover_factors_from_message(oracle.public(), &message, &faulty), 1)
    } else {
        (
            crt_fault_attack(oracle.public(), &oracle, &message).map(|outcome| outcome.factors),
            2,
        )
    };
    let elapsed = started.elapsed();

    let (recovered, success) = match result {
        Ok(factors) => {
            let success = &factors.p * &factors.q == *keys.n();
            (factors.to_string(), success)
        }
        Err(err @ Error::FaultDidNotExposeFactor { .. }) => {
            eprintln!("{err}");
            ("nothing".to_string(), false)
        }
        Err(err) => return Err(err).context("running the attack"),
    };

    let report = AttackReport {
        attack: if args.lenstra { "crt fault (lenstra)" } else { "crt fault" },
        key_bits: keys.public().bits(),
        recovered,
        queries,
        elapsed,
        success,
    };
    println!("{report}");
    Ok(report.exit_code())
}
