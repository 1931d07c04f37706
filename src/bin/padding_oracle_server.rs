// Serve a PKCS#1 v1.5 padding oracle over HTTP for the Bleichenbacher demo.
use rsa_breaker::{
    generate_key_pair, spawn_padding_oracle_server, PaddingCheck, Pkcs1PaddingOracle,
};

use anyhow::Context;
use clap::Parser;
use log::info;
use rand::{rngs::StdRng, SeedableRng};

#[derive(Parser, Debug)]
#[command(about = "HTTP padding oracle: GET /padding?ciphertext=<hex>", long_about = None)]
struct Args {
    #[arg(long, default_value_t = 512)]
    bits: u64,
    /// Key seed. Give the attacking client the same seed and key size.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value = "127.0.0.1:8000")]
    address: String,
    /// Check the whole padding, not just `00 02`.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let keys = generate_key_pair(args.bits, &mut rng)
        .with_context(|| format!("generating a {}-bit key", args.bits))?;
    let check = if args.strict {
        PaddingCheck::Strict
    } else {
        PaddingCheck::PrefixOnly
    };
    let oracle = Pkcs1PaddingOracle::new(keys, check);
    let n = oracle.public().n.clone();

    let url = spawn_padding_oracle_server(args.address.as_str(), oracle)
        .await
        .with_context(|| format!("binding {}", args.address))?;
    println!("padding oracle listening on {url}");
    println!("n = {n:x}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
