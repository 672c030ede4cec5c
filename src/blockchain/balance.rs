use std::collections::HashMap;

use super::block::Block;
use super::crypto::Address;

/// Confirmed balance of every address seen on the chain.
///
/// Updated incrementally as blocks are appended and rebuilt wholesale when
/// the chain is replaced. Must always agree with [`rescan_balance`].
#[derive(Debug, Clone, Default)]
pub struct BalanceIndex {
    balances: HashMap<Address, f64>,
}

impl BalanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index by replaying every block of `chain`
    pub fn from_chain(chain: &[Block]) -> Self {
        let mut index = BalanceIndex::new();
        for block in chain {
            index.apply_block(block);
        }
        index
    }

    /// Credits recipients and debits senders of every transaction in `block`.
    ///
    /// Per-address operations are applied in chain order so the result is
    /// bit-identical to a full rescan.
    pub fn apply_block(&mut self, block: &Block) {
        for transaction in block.transactions() {
            *self
                .balances
                .entry(transaction.recipient().clone())
                .or_insert(0.0) += transaction.value();
            *self
                .balances
                .entry(transaction.sender().clone())
                .or_insert(0.0) -= transaction.value();
        }
    }

    /// Confirmed balance of `address` (zero if never seen)
    pub fn balance(&self, address: &Address) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

/// Confirmed balance of `address` computed by scanning the whole chain
pub fn rescan_balance(chain: &[Block], address: &Address) -> f64 {
    let mut total = 0.0;
    for block in chain {
        for transaction in block.transactions() {
            if transaction.recipient() == address {
                total += transaction.value();
            }
            if transaction.sender() == address {
                total -= transaction.value();
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Hash;
    use crate::blockchain::Transaction;

    fn transfer(sender: &str, recipient: &str, value: f64) -> Transaction {
        Transaction::new(Address::from(sender), Address::from(recipient), value)
    }

    fn sample_chain() -> Vec<Block> {
        let genesis = Block::genesis();
        let first = Block::new(
            1,
            genesis.hash(),
            vec![transfer("MINT", "alice", 10.0), transfer("alice", "bob", 0.1)],
        );
        let second = Block::new(
            2,
            first.hash(),
            vec![transfer("bob", "alice", 0.05), transfer("alice", "alice", 3.0)],
        );
        vec![genesis, first, second]
    }

    #[test]
    fn test_index_matches_rescan() {
        let chain = sample_chain();
        let index = BalanceIndex::from_chain(&chain);

        for name in ["alice", "bob", "MINT", "nobody"] {
            let address = Address::from(name);
            assert_eq!(index.balance(&address), rescan_balance(&chain, &address));
        }
        assert_eq!(index.balance(&Address::from("nobody")), 0.0);
    }

    #[test]
    fn test_incremental_apply() {
        let chain = sample_chain();
        let mut index = BalanceIndex::new();
        assert!(index.is_empty());

        index.apply_block(&chain[1]);
        assert_eq!(index.balance(&Address::from("alice")), 10.0 - 0.1);

        let extra = Block::new(3, Hash::zero(), vec![transfer("alice", "carol", 1.0)]);
        index.apply_block(&extra);
        assert_eq!(index.balance(&Address::from("carol")), 1.0);
        assert_eq!(index.len(), 4);
    }
}
