// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block and transaction structures
// - Cryptography utilities and signature verification
// - Pending transaction pool and balance index
// - Proof of work search
// - Longest-chain consensus

pub mod balance;
pub mod block;
pub mod chain;
pub mod consensus;
pub mod crypto;
pub mod miner;
pub mod pool;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, Hash};
pub use chain::{Blockchain, LedgerError};
pub use crypto::{Address, PublicKey, TransactionSignature, Wallet};
pub use transaction::{SignedTransaction, Transaction, TransactionError, TransactionRequest};
