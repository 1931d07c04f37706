// Recover an RSA private exponent from decryption timings.
use rsa_breaker::{
    generate_key_pair, timing_attack, AttackReport, Error, KeyMaterial, RecoveredExponent,
    SimulatedTimingOracle, TimingAttackConfig, TimingOracle, TimingProfile,
    WallClockTimingOracle,
};

use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};

use std::{process::ExitCode, time::Duration};

#[derive(Parser, Debug)]
#[command(about = "Timing attack on Montgomery square-and-multiply", long_about = None)]
struct Args {
    #[arg(long, default_value_t = 64)]
    bits: u64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Chosen ciphertexts to measure, and to add on each retry.
    #[arg(long, default_value_t = 8000)]
    ciphertexts: usize,
    /// Timings summed per ciphertext.
    #[arg(long, default_value_t = 1)]
    samples: usize,
    /// Only recover this many leading exponent bits.
    #[arg(long)]
    max_bits: Option<usize>,
    #[arg(long, default_value_t = 2)]
    max_retries: u32,
    /// Uniform noise added to every simulated timing, in nanoseconds.
    #[arg(long)]
    jitter_ns: Option<u64>,
    /// Measure a real clock instead of the simulated cost model.
    #[arg(long)]
    wall_clock: bool,
    /// Busy wait per extra reduction for the wall-clock oracle, in nanoseconds.
    #[arg(long, default_value_t = 2000)]
    delay_ns: u64,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let keys = generate_key_pair(args.bits, &mut rng)
        .with_context(|| format!("generating a {}-bit key", args.bits))?;
    let config = TimingAttackConfig {
        ciphertexts: args.ciphertexts,
        samples_per_ciphertext: args.samples,
        max_bits: args.max_bits,
        max_retries: args.max_retries,
        seed: args.seed,
        ..TimingAttackConfig::default()
    };

    let result = if args.wall_clock {
        let mut oracle = WallClockTimingOracle::new(&keys, Duration::from_nanos(args.delay_ns))?;
        attack(&keys, &mut oracle, &config)
    } else {
        let profile = TimingProfile {
            jitter: args.jitter_ns.map(Duration::from_nanos),
            ..TimingProfile::default()
        };
        let mut oracle = SimulatedTimingOracle::new(&keys, profile, args.seed)?;
        attack(&keys, &mut oracle, &config)
    };

    let report = AttackReport {
        attack: "timing",
        key_bits: keys.public().bits(),
        recovered: "nothing".to_string(),
        queries: 0,
        elapsed: Duration::ZERO,
        success: false,
    };
    let report = match result {
        Ok(recovered) => {
            let expected = &keys.d >> (keys.d.bits() - recovered.prefix.len() as u64);
            AttackReport {
                recovered: format!(
                    "{} of {} exponent bits: {:x}",
                    recovered.prefix.len(),
                    keys.d.bits(),
                    recovered.exponent
                ),
                queries: recovered.measurements,
                elapsed: recovered.elapsed,
                success: recovered.exponent == expected,
                ..report
            }
        }
        Err(err @ Error::AmbiguousBitRecovery { .. }) => {
            eprintln!("{err}");
            report
        }
        Err(err) => return Err(err).context("running the attack"),
    };

    println!("{report}");
    Ok(report.exit_code())
}

fn attack(
    keys: &KeyMaterial,
    oracle: &mut impl TimingOracle,
    config: &TimingAttackConfig,
) -> rsa_breaker::Result<RecoveredExponent> {
    timing_attack(keys.public(), keys.d.bits(), oracle, config)
}
