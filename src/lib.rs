//! Proof-of-work ledger node.
//!
//! Each node keeps a chain of blocks, a pool of pending signed transfers and
//! a static list of neighbors it synchronizes with by adopting the longest
//! valid chain.

pub mod blockchain;
pub mod config;
pub mod network;
pub mod node;

pub use blockchain::{Block, Blockchain, LedgerError, Transaction, Wallet};
pub use config::NodeConfig;
pub use node::{Node, NodeError};
