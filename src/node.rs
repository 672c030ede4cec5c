//! Request layer of a ledger node.
//!
//! A [`Node`] is constructed once at process start, owns its ledger and
//! serves every request operation a front end (HTTP, CLI, tests) needs.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::blockchain::{
    Address, Block, Blockchain, LedgerError, Transaction, TransactionError, TransactionRequest,
    Wallet,
};
use crate::config::NodeConfig;
use crate::network::{Broadcaster, ChainResponse, PeerClient};

/// Errors returned to request callers
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] TransactionError),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("{0}")]
    LedgerError(#[from] LedgerError),

    #[error("Worker error: {0}")]
    WorkerError(String),
}

/// A locally managed wallet as handed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub private_key: String,
    pub public_key: String,
    pub blockchain_address: String,
}

impl From<&Wallet> for WalletResponse {
    fn from(wallet: &Wallet) -> Self {
        WalletResponse {
            private_key: wallet.private_key_hex(),
            public_key: wallet.public_key().to_hex(),
            blockchain_address: wallet.address().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountResponse {
    pub blockchain_address: String,
    pub amount: f64,
}

pub struct Node {
    config: NodeConfig,
    ledger: Arc<Blockchain>,
    auto_miner: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Creates a node with a fresh miner wallet and a genesis-only ledger.
    ///
    /// Spawns one outbound worker per remote neighbor, so it must run inside
    /// a tokio runtime whenever neighbors are configured.
    pub fn new(config: NodeConfig, peers: Arc<dyn PeerClient>) -> Self {
        let outbox = Broadcaster::spawn(
            &config.remote_neighbors(),
            Arc::clone(&peers),
            config.outbound_queue_capacity,
            config.peer_timeout(),
        );

        let miner_wallet = Wallet::new();
        let ledger = Arc::new(Blockchain::new(
            &config,
            miner_wallet.address().clone(),
            peers,
            outbox,
        ));
        ledger.register_wallet(miner_wallet);
        info!("blockchain_address {}", ledger.blockchain_address());

        Node {
            config,
            ledger,
            auto_miner: Mutex::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<Blockchain> {
        &self.ledger
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Catches up with neighbors at start-up
    pub async fn run(&self) {
        self.ledger.resolve_conflicts().await;
    }

    /// Generates and registers a new wallet
    pub fn create_wallet(&self) -> WalletResponse {
        let wallet = Wallet::new();
        let response = WalletResponse::from(&wallet);
        self.ledger.register_wallet(wallet);
        response
    }

    pub fn wallet(&self, address: &str) -> Result<WalletResponse, NodeError> {
        self.ledger
            .wallet(&Address::from(address))
            .map(|wallet| WalletResponse::from(&wallet))
            .ok_or_else(|| NodeError::WalletNotFound(address.to_string()))
    }

    pub fn wallet_amount(&self, address: &str) -> AmountResponse {
        AmountResponse {
            blockchain_address: address.to_string(),
            amount: self.ledger.calculate_total_amount(&Address::from(address)),
        }
    }

    /// The chain fetch record served to clients and neighbors
    pub fn chain_response(&self) -> ChainResponse {
        let (chain, transaction_pool) = self.ledger.snapshot();

        ChainResponse {
            chain_length: chain.len(),
            chain,
            transaction_pool,
            blockchain_address: self.ledger.blockchain_address().to_string(),
            host: self.config.host.clone(),
            port: self.config.port,
            mining: self.is_auto_mining(),
            mining_difficulty: self.ledger.difficulty(),
            mining_reward: self.ledger.mining_reward(),
            neighbors: self.config.neighbors.clone(),
        }
    }

    pub fn transaction_pool(&self) -> Vec<Transaction> {
        self.ledger.transaction_pool()
    }

    /// A client submits a signed transaction; accepted ones are propagated
    pub fn submit_transaction(&self, request: TransactionRequest) -> Result<(), NodeError> {
        let signed = request.into_signed()?;
        self.ledger.create_transaction(signed)?;
        Ok(())
    }

    /// A neighbor forwards a transaction it already accepted
    pub fn receive_transaction(&self, request: TransactionRequest) -> Result<(), NodeError> {
        let signed = request.into_signed()?;
        self.ledger.add_transaction(
            signed.transaction().clone(),
            Some(signed.public_key()),
            Some(signed.signature()),
        )?;
        Ok(())
    }

    pub fn clear_pool(&self) {
        self.ledger.clear_transaction_pool();
    }

    /// Mines one block on a blocking worker thread
    pub async fn mine(&self) -> Result<Block, NodeError> {
        mine_on_worker(Arc::clone(&self.ledger)).await
    }

    pub async fn resolve_conflicts(&self) -> bool {
        self.ledger.resolve_conflicts().await
    }

    fn auto_miner(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.auto_miner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mines immediately and then every configured interval until stopped.
    ///
    /// Returns `false` if auto-mining was already running.
    pub fn start_mining(&self) -> bool {
        let mut auto_miner = self.auto_miner();
        if auto_miner.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let ledger = Arc::clone(&self.ledger);
        let period = self.config.mining_interval();
        info!("Start mining every {:?}", period);

        *auto_miner = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match mine_on_worker(Arc::clone(&ledger)).await {
                    Ok(block) => info!("Mined block with nonce {}", block.nonce()),
                    Err(NodeError::LedgerError(err)) => warn!("Auto-mining skipped: {}", err),
                    Err(err) => error!("Auto-mining failed: {}", err),
                }
            }
        }));
        true
    }

    /// Stops auto-mining. A block already being mined is still appended.
    pub fn stop_mining(&self) {
        if let Some(handle) = self.auto_miner().take() {
            handle.abort();
            info!("Stop mining");
        }
    }

    pub fn is_auto_mining(&self) -> bool {
        self.auto_miner()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop_mining();
    }
}

async fn mine_on_worker(ledger: Arc<Blockchain>) -> Result<Block, NodeError> {
    let block = tokio::task::spawn_blocking(move || ledger.mining())
        .await
        .map_err(|e| NodeError::WorkerError(e.to_string()))??;
    Ok(block)
}
