//! twoparty-peer binary

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use twoparty_core::ProtocolConfig;
use std::time::Duration;
use twoparty_peer::{serve, spawn_cleanup, PeerState};

#[derive(Parser, Debug)]
#[command(name = "twoparty-peer")]
#[command(about = "Counterparty service for two-party threshold signing")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "TWOPARTY_LISTEN", default_value = "0.0.0.0:8822")]
    listen: String,

    /// Smallest Paillier modulus accepted from initiators
    #[arg(long, env = "TWOPARTY_MIN_MODULUS_BITS", default_value_t = twoparty_core::config::DEFAULT_MIN_PEER_MODULUS_BITS)]
    min_modulus_bits: usize,

    /// How long a share superseded by rotation stays usable, in seconds
    #[arg(long, env = "TWOPARTY_SUPERSEDED_RETENTION_SECS", default_value_t = 86_400)]
    superseded_retention: u64,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        listen = %args.listen,
        min_modulus_bits = args.min_modulus_bits,
        superseded_retention = args.superseded_retention,
        "Starting twoparty peer"
    );

    let config = ProtocolConfig::default().with_min_peer_modulus_bits(args.min_modulus_bits);
    let state = PeerState::new(config);
    spawn_cleanup(
        state.store.clone(),
        Duration::from_secs(args.superseded_retention),
        Duration::from_secs(60),
    );

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    serve(listener, state).await?;

    Ok(())
}
