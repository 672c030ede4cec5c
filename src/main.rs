use anyhow::Context;
use clap::Parser;
use log::info;

use std::path::PathBuf;
use std::sync::Arc;

use pow_ledger::network::HttpPeerClient;
use pow_ledger::{Node, NodeConfig};

/// Runs a single ledger node
#[derive(Debug, Parser)]
#[command(name = "pow-ledger-node", version, about)]
struct Cli {
    /// Port this node is known as by its neighbors
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML config file, defaults are used if it does not exist
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Mine a block every configured interval
    #[arg(long)]
    auto_mine: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = NodeConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.apply_env().context("reading environment overrides")?;

    let peers = Arc::new(HttpPeerClient::new(config.peer_timeout())?);
    let node = Node::new(config, peers);

    info!(
        "Node {} starting with difficulty {} and neighbors {:?}",
        node.config().self_address(),
        node.ledger().difficulty(),
        node.ledger().neighbors()
    );

    node.run().await;
    info!("Chain length after sync: {}", node.ledger().chain_len());

    if cli.auto_mine {
        node.start_mining();
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    node.stop_mining();
    info!("Shutting down");
    Ok(())
}
