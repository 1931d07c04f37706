// Recover a PKCS#1 v1.5 encrypted message through a padding oracle.
use rsa_breaker::{
    bleichenbacher_attack, generate_key_pair, os2ip, pkcs1_pad, AttackReport,
    BleichenbacherConfig, Error, PaddingCheck, PaddingOracle, Pkcs1PaddingOracle, PublicKey,
    RemotePaddingOracle,
};

use anyhow::Context;
use clap::Parser;
use num_bigint::BigUint;
use rand::{rngs::StdRng, SeedableRng};

use std::{process::ExitCode, time::Duration};

#[derive(Parser, Debug)]
#[command(about = "Bleichenbacher's padding oracle attack on PKCS#1 v1.5", long_about = None)]
struct Args {
    /// Size of the RSA modulus.
    #[arg(long, default_value_t = 512)]
    bits: u64,
    /// Seed for key generation and padding. A remote oracle server must be
    /// started with the same seed and key size.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Message to encrypt and then recover.
    #[arg(long, default_value = "attack at dawn!!")]
    message: String,
    /// Make the local oracle check the whole padding, not just `00 02`.
    #[arg(long)]
    strict: bool,
    #[arg(long, default_value_t = 5_000_000)]
    max_queries: u64,
    /// Give up after this many seconds.
    #[arg(long)]
    time_limit: Option<u64>,
    /// Query a padding oracle server at this URL instead of a local oracle.
    #[arg(long)]
    remote: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let keys = generate_key_pair(args.bits, &mut rng)
        .with_context(|| format!("generating a {}-bit key", args.bits))?;
    let block = pkcs1_pad(args.message.as_bytes(), keys.public().byte_len(), &mut rng)
        .context("padding the message")?;
    let ciphertext = keys.encrypt(&os2ip(&block));

    let config = BleichenbacherConfig {
        max_queries: args.max_queries,
        time_limit: args.time_limit.map(Duration::from_secs),
        blinding_seed: args.seed,
    };
    let report = match &args.remote {
        Some(url) => {
            let oracle = RemotePaddingOracle::new(url, keys.public());
            attack(&ciphertext, keys.public(), &oracle, &config, args.message.as_bytes())?
        }
        None => {
            let check = if args.strict {
                PaddingCheck::Strict
            } else {
                PaddingCheck::PrefixOnly
            };
            let oracle = Pkcs1PaddingOracle::new(keys.clone(), check);
            attack(&ciphertext, keys.public(), &oracle, &config, args.message.as_bytes())?
        }
    };

    println!("{report}");
    Ok(report.exit_code())
}

fn attack(
    ciphertext: &BigUint,
    public: &PublicKey,
    oracle: &impl PaddingOracle,
    config: &BleichenbacherConfig,
    expected: &[u8],
) -> anyhow::Result<AttackReport> {
    let report = AttackReport {
        attack: "bleichenbacher",
        key_bits: public.bits(),
        recovered: "nothing".to_string(),
        queries: 0,
        elapsed: Duration::ZERO,
        success: false,
    };
    match bleichenbacher_attack(ciphertext, public, oracle, config) {
        Ok(outcome) => {
            let message = outcome.message().context("unpadding the recovered block")?;
            Ok(AttackReport {
                recovered: format!("{:?}", String::from_utf8_lossy(&message)),
                queries: outcome.queries,
                elapsed: outcome.elapsed,
                success: message == expected,
                ..report
            })
        }
        Err(err @ Error::OracleExhausted { queries, .. }) => {
            eprintln!("{err}");
            Ok(AttackReport { queries, ..report })
        }
        Err(err) => Err(err).context("running the attack"),
    }
}
