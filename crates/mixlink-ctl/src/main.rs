//! mixlink-ctl: command-line edge for mixlink sessions.
//!
//! Payloads are typed as hex here and decoded before they reach a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use mixlink_core::config::{MixlinkConfig, SessionConfig};
use mixlink_core::payload::decode_hex;
use mixlink_core::Keypair;
use mixlink_session::{block_store, Collaborators, Delivery, LoopbackNetwork, Session};

const LOOPBACK_PROVIDER: &str = "loopback";
const DEFAULT_USER: &str = "alice";
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

// ── Subcommand handlers ───────────────────────────────────────────────────────

fn cmd_keygen(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, refusing to overwrite", path.display());
    }
    let keypair = Keypair::generate();
    keypair
        .store(path)
        .with_context(|| format!("failed to write key to {}", path.display()))?;
    println!("Wrote {}", path.display());
    println!("Public key: {}", keypair.public());
    Ok(())
}

fn cmd_config(config: &MixlinkConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

/// The configured account and link key, moved onto the loopback provider.
fn loopback_sender_config(config: &MixlinkConfig) -> Result<SessionConfig> {
    let mut loopback = config.clone();
    if loopback.account.user.is_empty() {
        loopback.account.user = DEFAULT_USER.into();
    }
    if !loopback.account.provider.is_empty() && loopback.account.provider != LOOPBACK_PROVIDER {
        tracing::info!(
            provider = %loopback.account.provider,
            "running over loopback instead of the configured provider"
        );
    }
    loopback.account.provider = LOOPBACK_PROVIDER.into();
    loopback
        .session_config()
        .context("failed to build session config")
}

async fn cmd_roundtrip(config: &MixlinkConfig, hex_payload: &str) -> Result<()> {
    let payload = decode_hex(hex_payload)?;

    let network = LoopbackNetwork::new();
    let block_store =
        block_store::from_config(&config.storage).context("failed to open block store")?;
    let collaborators = Collaborators::new(Arc::new(network.clone()), Arc::new(network.clone()))
        .with_block_store(block_store);

    let sender = Session::new(loopback_sender_config(config)?, collaborators.clone());
    let receiver = Session::new(
        SessionConfig::new("echo", LOOPBACK_PROVIDER)
            .with_ingress_capacity(config.session.ingress_capacity)
            .with_max_payload_len(config.session.max_payload_len),
        collaborators,
    );

    let identity = Arc::new(
        Keypair::load_or_generate(&config.account.identity_key_path)
            .context("failed to load identity key")?,
    );
    sender.connect(identity)?;
    receiver.connect(Arc::new(Keypair::generate()))?;

    let key = sender.resolve("echo")?;
    println!("Resolved echo@{LOOPBACK_PROVIDER} → {key}");

    let receipt = sender.send("echo", LOOPBACK_PROVIDER, &payload)?;
    println!("Sent message {}", receipt.id());

    let delivery = tokio::time::timeout(ACK_TIMEOUT, receipt.delivered())
        .await
        .context("timed out waiting for acknowledgment")?;
    match delivery {
        Delivery::Acked { id, latency, .. } => {
            println!("Acknowledged {id} after {:.1} ms", latency.as_secs_f64() * 1000.0)
        }
        Delivery::Abandoned { id } => bail!("message {id} was abandoned"),
    }

    let message = receiver.get_message().await?;
    println!("Received {} bytes", message.payload.len());
    println!(
        "  from    : {}",
        message.sender.map(|k| k.to_string()).unwrap_or_else(|| "anonymous".into())
    );
    println!("  payload : {}", hex::encode(&message.payload));

    println!("{}", serde_json::to_string_pretty(&sender.stats())?);

    sender.shutdown();
    receiver.shutdown();
    tracing::info!("roundtrip complete");
    Ok(())
}

fn print_usage() {
    println!("Usage: mixlink-ctl [--config <path>] <command>");
    println!();
    println!("Commands:");
    println!("  keygen <path>          Generate an X25519 key and write it to <path>");
    println!("  config                 Print the effective configuration");
    println!("  roundtrip <hex>        Send <hex> over a loopback session and wait for the ACK");
    println!();
    println!("Options:");
    println!("  --config <path>   Config file (default: $MIXLINK_CONFIG or ~/.config/mixlink/config.toml)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path = MixlinkConfig::file_path();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            i += 1;
            config_path = PathBuf::from(args.get(i).context("--config requires a value")?);
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    if let Err(e) = MixlinkConfig::write_default_at(&config_path) {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MixlinkConfig::load_from(config_path.clone())
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), backend = ?config.storage.backend, "config loaded");

    match remaining.as_slice() {
        ["keygen", path]                => cmd_keygen(Path::new(path)),
        ["config"]                      => cmd_config(&config, &config_path),
        ["roundtrip", payload]          => cmd_roundtrip(&config, payload).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
