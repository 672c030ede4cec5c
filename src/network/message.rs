use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Transaction, TransactionRequest};

/// Fire-and-forget notifications sent to neighbors
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Propagate a transaction this node accepted
    Transaction(TransactionRequest),

    /// A block was appended, so pending transactions are no longer pending
    ClearPool,

    /// A block was mined; neighbors should re-run conflict resolution
    ResolveConsensus,
}

impl PeerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Transaction(_) => "transaction",
            PeerMessage::ClearPool => "clear-pool",
            PeerMessage::ResolveConsensus => "consensus",
        }
    }
}

/// Chain fetch response exchanged between nodes.
///
/// Only `chain` is required when decoding; the remaining fields describe the
/// serving node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub chain_length: usize,
    pub transaction_pool: Vec<Transaction>,
    pub blockchain_address: String,
    pub host: String,
    pub port: u16,
    pub mining: bool,
    pub mining_difficulty: usize,
    pub mining_reward: f64,
    pub neighbors: Vec<String>,
}
