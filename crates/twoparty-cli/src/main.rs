//! twoparty CLI
//!
//! Runs the initiating side of two-party operations against a peer:
//! - Key generation for either scheme
//! - Signing a hex digest
//! - Share rotation
//! - secp256k1 key export

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use twoparty_client::{Engine, EngineConfig};
use twoparty_core::{SavedShare, Scope, Signature};

/// Two-party threshold signing party node
#[derive(Parser)]
#[command(name = "twoparty")]
#[command(about = "Two-party threshold signing client")]
#[command(version)]
struct Cli {
    /// Peer websocket address
    #[arg(short, long, env = "TWOPARTY_PEER", default_value = "ws://127.0.0.1:8822/ws")]
    peer: String,

    /// Directory for share files
    #[arg(short, long, env = "TWOPARTY_SHARE_DIR", default_value = "./shares")]
    share_dir: PathBuf,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new joint key
    Keygen {
        /// secp256k1 or ed25519
        #[arg(short, long)]
        scope: Scope,

        /// Owner identity
        #[arg(short, long)]
        identity: String,
    },

    /// Sign a digest
    Sign {
        #[arg(short = 'f', long)]
        share_file: PathBuf,

        /// Hex digest; exactly 32 bytes for secp256k1
        #[arg(short, long)]
        digest: String,
    },

    /// Rotate a share; the new share is written next to the old one
    Rotate {
        #[arg(short = 'f', long)]
        share_file: PathBuf,
    },

    /// Reconstruct the secp256k1 private key
    Export {
        #[arg(short = 'f', long)]
        share_file: PathBuf,
    },

    /// Show share info
    Info {
        #[arg(short = 'f', long)]
        share_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let engine = Engine::new(EngineConfig::from_env()?);

    match cli.command {
        Commands::Keygen { scope, ref identity } => {
            run_keygen(&cli, &engine, scope, identity).await?;
        }
        Commands::Sign {
            ref share_file,
            ref digest,
        } => {
            run_sign(&cli, &engine, share_file, digest).await?;
        }
        Commands::Rotate { ref share_file } => {
            run_rotate(&cli, &engine, share_file).await?;
        }
        Commands::Export { ref share_file } => {
            run_export(&cli, &engine, share_file).await?;
        }
        Commands::Info { ref share_file } => {
            show_info(share_file)?;
        }
    }

    Ok(())
}

async fn run_keygen(cli: &Cli, engine: &Engine, scope: Scope, identity: &str) -> Result<()> {
    info!(%scope, identity, peer = %cli.peer, "Starting keygen");

    let share = engine.keygen(scope, identity, &cli.peer).await?;
    let path = save_share(&cli.share_dir, &share)?;

    info!(share_id = %share.share_id, path = ?path, "Keygen completed, share saved");
    println!("Share ID: {}", share.share_id);
    println!("Public Key: {}", share.public_key_hex());

    Ok(())
}

async fn run_sign(cli: &Cli, engine: &Engine, share_file: &Path, digest: &str) -> Result<()> {
    let share = load_share(share_file)?;
    let digest = hex::decode(digest.trim_start_matches("0x")).context("digest must be hex")?;

    let signature = engine.sign(&cli.peer, &share, &digest).await?;

    println!("Signature:");
    match signature {
        Signature::Ecdsa(sig) => {
            println!("  r: {}", hex::encode(sig.r));
            println!("  s: {}", hex::encode(sig.s));
            println!("  v: {}", sig.v);
            println!("  DER: {}", hex::encode(sig.to_der()?));
        }
        Signature::Eddsa(bytes) => {
            println!("  {}", hex::encode(bytes));
        }
    }

    Ok(())
}

async fn run_rotate(cli: &Cli, engine: &Engine, share_file: &Path) -> Result<()> {
    let share = load_share(share_file)?;
    info!(share_id = %share.share_id, "Starting rotation");

    let rotated = engine.rotate(&cli.peer, &share).await?;
    let path = save_share(&cli.share_dir, &rotated)?;

    info!(share_id = %rotated.share_id, path = ?path, "Rotation completed, old share superseded");
    println!("New Share ID: {}", rotated.share_id);

    Ok(())
}

async fn run_export(cli: &Cli, engine: &Engine, share_file: &Path) -> Result<()> {
    let share = load_share(share_file)?;
    if !share.scope.params().supports_export {
        bail!("{} shares cannot be exported", share.scope);
    }

    let private_key = engine.export(&cli.peer, &share).await?;
    println!("Private Key: {private_key}");
    eprintln!("This share must not be used again");

    Ok(())
}

fn show_info(share_file: &Path) -> Result<()> {
    let share = load_share(share_file)?;

    println!("Share Info:");
    println!("  Identity: {}", share.identity_id);
    println!("  Share ID: {}", share.share_id);
    println!("  Scope: {}", share.scope);
    println!("  Party: {}", share.party.index());
    println!("  Public Key: {}", share.public_key_hex());

    Ok(())
}

fn save_share(dir: &Path, share: &SavedShare) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("share.{}.json", share.share_id));
    std::fs::write(&path, serde_json::to_string_pretty(share)?)?;
    Ok(path)
}

fn load_share(path: &Path) -> Result<SavedShare> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(SavedShare::from_bytes(&bytes)?)
}
