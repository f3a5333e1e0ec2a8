#![forbid(unsafe_code)]
//! TrinityChain light client: REST server, signer, funds transfer and inclusion checker

use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trinity_client::api::{run_api_server, ClientNode};
use trinity_client::config::{load_config_from, DEFAULT_CONFIG_PATH};
use trinity_client::crypto::KeyPair;
use trinity_client::dispatcher::send_funds;
use trinity_client::merkle::verify_inclusion;
use trinity_client::network::PeerClient;
use trinity_client::transaction::factory::parse_hex;
use trinity_client::transaction::FundsTransfer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the REST API
    Serve {
        /// Path to the config file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
        /// Overrides `api.port` from the config
        #[arg(long)]
        port: Option<u16>,
    },
    /// Signs a transaction hash with a private key, offline
    Sign {
        /// Hex-encoded 32-byte private key
        #[arg(long)]
        key: String,
        /// Hex-encoded 32-byte transaction hash
        #[arg(long)]
        hash: String,
    },
    /// Builds a funds transfer, signs it with a private key and sends it
    Funds {
        /// Hex-encoded 32-byte private key of the sender
        #[arg(long)]
        key: String,
        /// Recipient public key, 128 hex characters
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "1")]
        fee: String,
        /// The sender's current transaction counter
        #[arg(long)]
        tx_cnt: String,
        #[arg(long, default_value = "0")]
        header: String,
        /// Peer to send to; defaults to `network.bootstrap_peer`
        #[arg(long)]
        peer: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Checks that a transaction is included in a block
    Verify {
        /// Hex-encoded block hash
        #[arg(long)]
        block: String,
        /// Hex-encoded transaction hash, as claimed
        #[arg(long)]
        tx: String,
        /// Hex-encoded hash recomputed from the transaction body
        #[arg(long)]
        recomputed: String,
        /// Peer to ask for the Merkle path; defaults to `network.bootstrap_peer`
        #[arg(long)]
        peer: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            init_logging();
            serve(&config, port).await?;
        }
        Commands::Sign { key, hash } => {
            sign(&key, &hash)?;
        }
        Commands::Funds {
            key,
            to,
            amount,
            fee,
            tx_cnt,
            header,
            peer,
            config,
        } => {
            init_logging();
            let transfer = FundsTransfer {
                header,
                amount,
                fee,
                tx_cnt,
                to,
            };
            funds(&config, &key, &transfer, peer).await?;
        }
        Commands::Verify {
            block,
            tx,
            recomputed,
            peer,
            config,
        } => {
            init_logging();
            verify(&config, &block, &tx, &recomputed, peer).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: &str, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_from(config_path)?;
    let port = port.unwrap_or(config.api.port);

    println!("{}", "TrinityChain Light Client".bright_cyan().bold());
    println!("  API port:       {}", port.to_string().bright_yellow());
    println!(
        "  Bootstrap peer: {}",
        config.network.bootstrap_peer.bright_yellow()
    );
    if config.api.allow_key_generation {
        println!(
            "{}",
            "  Server-side key generation is ENABLED. Private keys will appear in responses."
                .red()
                .bold()
        );
    }

    let node = Arc::new(ClientNode::from_config(&config));
    run_api_server(node, port).await
}

fn sign(key: &str, hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    let secret = parse_hex::<32>("key", key)?;
    let digest = parse_hex::<32>("hash", hash)?;

    let keypair = KeyPair::from_secret_bytes(&secret)?;
    let signature = keypair.sign_digest(&digest);

    println!("{}", hex::encode(signature));
    Ok(())
}

async fn funds(
    config_path: &str,
    key: &str,
    transfer: &FundsTransfer,
    peer: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_from(config_path)?;
    let sender = KeyPair::from_secret_bytes(&parse_hex::<32>("key", key)?)?;
    let endpoint = peer.unwrap_or(config.network.bootstrap_peer.clone());

    let client = PeerClient::new(config.network.timeout());
    let receipt = send_funds(&client, &endpoint, &sender, transfer).await?;

    println!("{}", receipt.message().green().bold());
    println!("TxHash: {}", hex::encode(receipt.hash).bright_yellow());
    Ok(())
}

async fn verify(
    config_path: &str,
    block: &str,
    tx: &str,
    recomputed: &str,
    peer: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_from(config_path)?;
    let block_hash = parse_hex::<32>("block", block)?;
    let tx_hash = parse_hex::<32>("tx", tx)?;
    let recomputed = parse_hex::<32>("recomputed", recomputed)?;
    let endpoint = peer.unwrap_or(config.network.bootstrap_peer.clone());

    let client = PeerClient::new(config.network.timeout());
    let valid = verify_inclusion(&client, &endpoint, &block_hash, &tx_hash, &recomputed).await?;

    if valid {
        println!("{}", "✅ Transaction is included in the block".green().bold());
    } else {
        println!("{}", "❌ Transaction could not be verified".red().bold());
        std::process::exit(1);
    }
    Ok(())
}
