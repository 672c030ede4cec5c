use log::debug;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::block::{Block, Hash};
use super::transaction::Transaction;

/// Timestamp used for every proof-of-work digest.
///
/// The proof covers (nonce, previous hash, transactions) only. The block's
/// real creation time never enters it, neither when mining nor validating.
pub const PROOF_TIMESTAMP: i64 = 0;

/// Checks that the proof digest starts with `difficulty` hex zeros
pub fn valid_proof(
    nonce: u64,
    previous_hash: &Hash,
    transactions: &[Transaction],
    difficulty: usize,
) -> bool {
    Block::digest(nonce, previous_hash, PROOF_TIMESTAMP, transactions).leading_zero_digits()
        >= difficulty
}

/// Proof-of-work nonce search
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    difficulty: usize,
}

impl Miner {
    pub fn new(difficulty: usize) -> Self {
        Miner { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Searches nonce = 0, 1, 2, ... until the proof holds.
    ///
    /// Returns `None` if `abort` is raised before a nonce is found.
    pub fn search(
        &self,
        previous_hash: &Hash,
        transactions: &[Transaction],
        abort: &AtomicBool,
    ) -> Option<u64> {
        let start = Instant::now();
        let mut nonce: u64 = 0;

        loop {
            if abort.load(Ordering::Relaxed) {
                debug!("Proof of work aborted after {} attempts", nonce);
                return None;
            }

            if valid_proof(nonce, previous_hash, transactions, self.difficulty) {
                debug!(
                    "Found nonce {} after {} attempts in {:?}",
                    nonce,
                    nonce + 1,
                    start.elapsed()
                );
                return Some(nonce);
            }

            nonce = nonce.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Address;

    fn transactions() -> Vec<Transaction> {
        vec![Transaction::with_timestamp(
            Address::from("THE_BLOCKCHAIN"),
            Address::from("miner"),
            1.0,
            1_700_000_000,
        )]
    }

    #[test]
    fn test_search_finds_valid_nonce() {
        let miner = Miner::new(2);
        let previous = Block::genesis().hash();
        let transactions = transactions();

        let nonce = miner
            .search(&previous, &transactions, &AtomicBool::new(false))
            .unwrap();

        assert!(valid_proof(nonce, &previous, &transactions, 2));
        // The search returns the first valid nonce
        assert!((0..nonce).all(|n| !valid_proof(n, &previous, &transactions, 2)));
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let miner = Miner::new(0);
        let nonce = miner.search(&Hash::zero(), &[], &AtomicBool::new(false));
        assert_eq!(nonce, Some(0));
    }

    #[test]
    fn test_search_honors_abort() {
        // Unreachable target, so only the abort flag can end the search
        let miner = Miner::new(65);
        let nonce = miner.search(&Hash::zero(), &transactions(), &AtomicBool::new(true));
        assert_eq!(nonce, None);
    }

    #[test]
    fn test_proof_ignores_block_timestamp() {
        let previous = Hash::zero();
        let transactions = transactions();
        let nonce = Miner::new(1)
            .search(&previous, &transactions, &AtomicBool::new(false))
            .unwrap();

        let block = Block::new(nonce, previous, transactions);
        assert!(valid_proof(block.nonce(), block.previous_hash(), block.transactions(), 1));
    }
}
