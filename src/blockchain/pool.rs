use super::crypto::Address;
use super::transaction::Transaction;

/// Pending transactions waiting to be mined, in admission order
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    /// Creates an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an admitted transaction
    pub fn push(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Gets the number of pending transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Moves every pending transaction out, leaving the pool empty
    pub fn take(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    /// Whether the pool still begins with `prefix`, in order
    pub fn starts_with(&self, prefix: &[Transaction]) -> bool {
        self.transactions.starts_with(prefix)
    }

    /// Moves the first `count` transactions out, keeping the rest pending
    ///
    /// # Arguments
    ///
    /// * `count` - Number of leading entries to take; clamped to the pool size
    pub fn take_front(&mut self, count: usize) -> Vec<Transaction> {
        let count = count.min(self.transactions.len());
        self.transactions.drain(..count).collect()
    }

    /// Removes the most recently admitted entry equal to `transaction`
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed
    pub fn remove_last(&mut self, transaction: &Transaction) -> bool {
        match self.transactions.iter().rposition(|t| t == transaction) {
            Some(index) => {
                self.transactions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Applies pending debits and credits for `address` on top of `balance`
    pub fn adjust_balance(&self, address: &Address, mut balance: f64) -> f64 {
        for transaction in &self.transactions {
            if transaction.sender() == address {
                balance -= transaction.value();
            }
            if transaction.recipient() == address {
                balance += transaction.value();
            }
        }
        balance
    }

    /// Applies only pending debits for `address` on top of `balance`
    pub fn subtract_pending_debits(&self, address: &Address, mut balance: f64) -> f64 {
        for transaction in &self.transactions {
            if transaction.sender() == address {
                balance -= transaction.value();
            }
        }
        balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(sender: &str, recipient: &str, value: f64) -> Transaction {
        Transaction::new(Address::from(sender), Address::from(recipient), value)
    }

    #[test]
    fn test_take_preserves_order_and_empties() {
        let mut pool = TransactionPool::new();
        pool.push(transfer("a", "b", 1.0));
        pool.push(transfer("b", "c", 2.0));

        let taken = pool.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].sender().as_str(), "a");
        assert_eq!(taken[1].sender().as_str(), "b");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_balance_adjustments() {
        let mut pool = TransactionPool::new();
        pool.push(transfer("a", "b", 3.0));
        pool.push(transfer("c", "a", 1.0));

        let address = Address::from("a");
        assert_eq!(pool.adjust_balance(&address, 10.0), 8.0);
        assert_eq!(pool.subtract_pending_debits(&address, 10.0), 7.0);
    }

    #[test]
    fn test_take_front_keeps_later_entries() {
        let mut pool = TransactionPool::new();
        let staged = vec![transfer("a", "b", 1.0), transfer("b", "c", 2.0)];
        for transaction in &staged {
            pool.push(transaction.clone());
        }
        pool.push(transfer("x", "y", 3.0));

        assert!(pool.starts_with(&staged));
        assert_eq!(pool.take_front(staged.len()), staged);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.as_slice()[0].sender().as_str(), "x");
        assert_eq!(pool.take_front(5).len(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_last_withdraws_one_entry() {
        let mut pool = TransactionPool::new();
        let reward = Transaction::with_timestamp(Address::from("R"), Address::from("m"), 1.0, 7);
        pool.push(reward.clone());
        pool.push(transfer("a", "b", 1.0));
        pool.push(reward.clone());

        assert!(pool.remove_last(&reward));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.as_slice()[0], reward);
        assert!(!pool.starts_with(&[transfer("z", "z", 1.0)]));

        pool.clear();
        assert!(!pool.remove_last(&reward));
    }
}
