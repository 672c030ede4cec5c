use dashmap::DashMap;
use log::{error, info, warn};
use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::config::NodeConfig;
use crate::network::{Broadcaster, PeerClient, PeerMessage};

use super::balance::{rescan_balance, BalanceIndex};
use super::block::{Block, Hash};
use super::consensus::ConsensusResolver;
use super::crypto::{verify_transaction_signature, Address, PublicKey, TransactionSignature, Wallet};
use super::miner::{valid_proof, Miner};
use super::pool::TransactionPool;
use super::transaction::{SignedTransaction, Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Invalid signature for transaction from {0}")]
    InvalidSignature(Address),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Mining is already in progress")]
    MiningInProgress,

    #[error("Mining aborted: a longer chain is being adopted")]
    MiningAborted,
}

/// Everything that is mutated together. Guarded by a single mutex so
/// admission, mining, pool clearing and chain replacement never interleave.
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pool: TransactionPool,
    balances: BalanceIndex,
}

impl LedgerState {
    fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    fn total_amount(&self, address: &Address) -> f64 {
        self.pool.adjust_balance(address, self.balances.balance(address))
    }

    fn spendable_amount(&self, address: &Address) -> f64 {
        self.pool
            .subtract_pending_debits(address, self.balances.balance(address))
    }
}

/// A single node's ledger: chain, pending pool, local wallets and the means
/// to reach its neighbors
pub struct Blockchain {
    state: Mutex<LedgerState>,

    /// Held for the whole of a mining run; contenders are turned away
    mining_lock: Mutex<()>,

    /// Set while a mining run is in flight
    mining_in_flight: AtomicBool,

    /// Raised to stop an in-flight proof of work
    abort_mining: AtomicBool,

    /// Address credited with mining rewards
    blockchain_address: Address,

    wallets: DashMap<Address, Wallet>,

    /// Leading hex zeros every proof must have, for local and fetched chains
    difficulty: usize,

    miner: Miner,
    mining_sender: Address,
    mining_reward: f64,

    outbox: Broadcaster,
    resolver: ConsensusResolver,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("blockchain_address", &self.blockchain_address)
            .field("difficulty", &self.difficulty)
            .field("neighbors", &self.resolver.neighbors())
            .finish()
    }
}

impl Blockchain {
    /// Creates a ledger holding only a genesis block.
    ///
    /// # Arguments
    ///
    /// * `config` - Mining parameters and the neighbor list
    /// * `blockchain_address` - The address credited with mining rewards
    /// * `peers` - Transport used to fetch neighbor chains
    /// * `outbox` - Queues for notifications to neighbors
    pub fn new(
        config: &NodeConfig,
        blockchain_address: Address,
        peers: Arc<dyn PeerClient>,
        outbox: Broadcaster,
    ) -> Self {
        let genesis = Block::genesis();
        let mut balances = BalanceIndex::new();
        balances.apply_block(&genesis);

        Blockchain {
            state: Mutex::new(LedgerState {
                chain: vec![genesis],
                pool: TransactionPool::new(),
                balances,
            }),
            mining_lock: Mutex::new(()),
            mining_in_flight: AtomicBool::new(false),
            abort_mining: AtomicBool::new(false),
            blockchain_address,
            wallets: DashMap::new(),
            difficulty: config.mining_difficulty,
            miner: Miner::new(config.mining_difficulty),
            mining_sender: Address(config.mining_sender.clone()),
            mining_reward: config.mining_reward,
            outbox,
            resolver: ConsensusResolver::new(
                config.remote_neighbors(),
                peers,
                config.peer_timeout(),
            ),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the address credited with this node's mining rewards
    pub fn blockchain_address(&self) -> &Address {
        &self.blockchain_address
    }

    /// Gets the number of leading hex zeros a proof needs
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Gets the value of each mining reward
    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// Gets the reserved sender identity of mining rewards
    pub fn mining_sender(&self) -> &Address {
        &self.mining_sender
    }

    /// Remote neighbors (this node excluded)
    pub fn neighbors(&self) -> &[String] {
        self.resolver.neighbors()
    }

    /// Appends a block built from the current pool, then clears the pool.
    ///
    /// Neighbors are asked to clear their own pools; delivery is best effort.
    ///
    /// # Arguments
    ///
    /// * `nonce` - The proof found for the pool
    /// * `previous_hash` - Hash of the block the new one links to
    ///
    /// # Returns
    ///
    /// The appended block
    pub fn create_block(&self, nonce: u64, previous_hash: Hash) -> Block {
        let block = {
            let mut state = self.lock_state();
            let transactions = state.pool.take();
            Self::append_block(&mut state, nonce, previous_hash, transactions)
        };

        self.outbox.broadcast(PeerMessage::ClearPool);
        block
    }

    fn append_block(
        state: &mut LedgerState,
        nonce: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Block {
        let block = Block::new(nonce, previous_hash, transactions);

        state.balances.apply_block(&block);
        state.chain.push(block.clone());

        info!(
            "Appended block {} with {} transactions",
            state.chain.len() - 1,
            block.transactions().len()
        );
        block
    }

    /// Admits a transaction into the pending pool.
    ///
    /// Reward transactions from the reserved mining sender are admitted as is.
    /// Everything else needs a signature by the sender's key and enough
    /// spendable balance.
    ///
    /// # Arguments
    ///
    /// * `transaction` - The transaction to admit
    /// * `sender_public_key` - Key claimed by the sender, unused for rewards
    /// * `signature` - Signature over the transaction's canonical encoding
    pub fn add_transaction(
        &self,
        transaction: Transaction,
        sender_public_key: Option<&PublicKey>,
        signature: Option<&TransactionSignature>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock_state();
        self.admit(&mut state, transaction, sender_public_key, signature)
    }

    fn admit(
        &self,
        state: &mut LedgerState,
        transaction: Transaction,
        sender_public_key: Option<&PublicKey>,
        signature: Option<&TransactionSignature>,
    ) -> Result<(), LedgerError> {
        if transaction.sender() == &self.mining_sender {
            info!("Mining reward of {} to {}", transaction.value(), transaction.recipient());
            state.pool.push(transaction);
            return Ok(());
        }

        let value = transaction.value();
        if !value.is_finite() || value <= 0.0 {
            error!("Rejected transaction from {} with value {}", transaction.sender(), value);
            return Err(TransactionError::InvalidAmount(value.to_string()).into());
        }

        let verified = match (sender_public_key, signature) {
            (Some(public_key), Some(signature)) => {
                verify_transaction_signature(public_key, signature, &transaction)
            }
            _ => false,
        };
        if !verified {
            error!("Failed to verify transaction from {}", transaction.sender());
            return Err(LedgerError::InvalidSignature(transaction.sender().clone()));
        }

        let available = state.spendable_amount(transaction.sender());
        if available < value {
            error!(
                "Not enough balance in {}: required {}, available {}",
                transaction.sender(),
                value,
                available
            );
            return Err(LedgerError::InsufficientBalance {
                required: value,
                available,
            });
        }

        info!("Verified transaction from {} to {}", transaction.sender(), transaction.recipient());
        state.pool.push(transaction);
        Ok(())
    }

    /// Client-facing entry: admits locally, then propagates to neighbors.
    ///
    /// Propagation is best effort and never undoes the local admission.
    pub fn create_transaction(&self, signed: SignedTransaction) -> Result<(), LedgerError> {
        self.add_transaction(
            signed.transaction().clone(),
            Some(signed.public_key()),
            Some(signed.signature()),
        )?;

        self.outbox
            .broadcast(PeerMessage::Transaction(signed.to_request()));
        Ok(())
    }

    /// Searches a nonce for the current pool on top of the last block.
    ///
    /// Works on a snapshot; the pool may change while the search runs.
    /// Returns `None` if mining is aborted meanwhile.
    pub fn proof_of_work(&self) -> Option<u64> {
        let (previous_hash, transactions) = {
            let state = self.lock_state();
            (state.last_block().hash(), state.pool.snapshot())
        };

        self.miner
            .search(&previous_hash, &transactions, &self.abort_mining)
    }

    /// Proof check under this node's difficulty
    pub fn valid_proof(&self, nonce: u64, previous_hash: &Hash, transactions: &[Transaction]) -> bool {
        valid_proof(nonce, previous_hash, transactions, self.difficulty)
    }

    /// Mints a reward, mines the pool into a new block and asks neighbors to
    /// resolve consensus.
    ///
    /// Only one mining run may be in flight; a concurrent call fails with
    /// [`LedgerError::MiningInProgress`] instead of waiting.
    ///
    /// # Returns
    ///
    /// The appended block, or [`LedgerError::MiningAborted`] if the chain
    /// moved on or the pool was cleared while the proof was being searched
    pub fn mining(&self) -> Result<Block, LedgerError> {
        let _mining = match self.mining_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!("Mining is already in progress");
                return Err(LedgerError::MiningInProgress);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        self.mining_in_flight.store(true, Ordering::SeqCst);
        let result = self.mine_block();
        self.mining_in_flight.store(false, Ordering::SeqCst);

        let block = result?;
        self.outbox.broadcast(PeerMessage::ClearPool);
        self.outbox.broadcast(PeerMessage::ResolveConsensus);
        Ok(block)
    }

    /// One mining round. The state lock is held only to stage the reward and
    /// to commit, never during the nonce search.
    fn mine_block(&self) -> Result<Block, LedgerError> {
        self.abort_mining.store(false, Ordering::SeqCst);

        let reward = Transaction::new(
            self.mining_sender.clone(),
            self.blockchain_address.clone(),
            self.mining_reward,
        );
        let (previous_hash, staged) = {
            let mut state = self.lock_state();
            self.admit(&mut state, reward.clone(), None, None)?;
            (state.last_block().hash(), state.pool.snapshot())
        };

        let nonce = self
            .miner
            .search(&previous_hash, &staged, &self.abort_mining);

        let mut state = self.lock_state();
        let still_current =
            state.last_block().hash() == previous_hash && state.pool.starts_with(&staged);

        match nonce {
            Some(nonce) if still_current => {
                // Transactions admitted during the search wait for the next block
                let transactions = state.pool.take_front(staged.len());
                Ok(Self::append_block(&mut state, nonce, previous_hash, transactions))
            }
            _ => {
                state.pool.remove_last(&reward);
                warn!("Mining aborted, reward withdrawn");
                Err(LedgerError::MiningAborted)
            }
        }
    }

    /// Checks hash links and proofs of every block after genesis.
    ///
    /// Proofs are checked against this node's difficulty. Genesis is trusted.
    pub fn valid_chain(&self, chain: &[Block]) -> bool {
        if chain.is_empty() {
            warn!("Rejecting empty chain");
            return false;
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);

            if block.previous_hash() != &previous.hash() {
                warn!("Block {} does not link to its predecessor", index + 1);
                return false;
            }

            if !self.valid_proof(block.nonce(), block.previous_hash(), block.transactions()) {
                warn!("Block {} has an invalid proof of work", index + 1);
                return false;
            }
        }

        true
    }

    /// Validates the local chain
    pub fn is_valid(&self) -> bool {
        let chain = self.chain();
        self.valid_chain(&chain)
    }

    /// Replaces the local chain with the longest valid neighbor chain that is
    /// strictly longer. Returns whether the chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let local_length = self.chain_len();

        let candidate = self
            .resolver
            .find_longest(local_length, |chain| self.valid_chain(chain))
            .await;

        let Some(candidate) = candidate else {
            info!("No conflicts found");
            return false;
        };

        let mut state = self.lock_state();
        if candidate.chain.len() <= state.chain.len() {
            info!(
                "Local chain grew to {} blocks, keeping it over {} from {}",
                state.chain.len(),
                candidate.chain.len(),
                candidate.neighbor
            );
            return false;
        }

        state.balances = BalanceIndex::from_chain(&candidate.chain);
        state.chain = candidate.chain;

        // A search started on the replaced tip can never be committed
        self.abort_mining.store(true, Ordering::SeqCst);
        info!(
            "Replaced chain with the longest chain from {} ({} blocks)",
            candidate.neighbor,
            state.chain.len()
        );
        true
    }

    /// Balance of `address`: confirmed credits minus debits, adjusted by
    /// pending pool entries
    pub fn calculate_total_amount(&self, address: &Address) -> f64 {
        self.lock_state().total_amount(address)
    }

    /// Same as [`calculate_total_amount`](Self::calculate_total_amount) but
    /// rescans the whole chain instead of reading the balance index
    pub fn rescan_total_amount(&self, address: &Address) -> f64 {
        let state = self.lock_state();
        state
            .pool
            .adjust_balance(address, rescan_balance(&state.chain, address))
    }

    /// Balance available for new spending: confirmed balance minus pending debits
    pub fn spendable_amount(&self, address: &Address) -> f64 {
        self.lock_state().spendable_amount(address)
    }

    /// Drops every pending transaction
    pub fn clear_transaction_pool(&self) {
        self.lock_state().pool.clear();
        info!("Transaction pool cleared");
    }

    /// Adds a locally managed wallet, keyed by its address
    pub fn register_wallet(&self, wallet: Wallet) {
        self.wallets.insert(wallet.address().clone(), wallet);
    }

    /// Gets a locally managed wallet
    ///
    /// # Arguments
    ///
    /// * `address` - The wallet's address
    ///
    /// # Returns
    ///
    /// The wallet if it was registered on this node
    pub fn wallet(&self, address: &Address) -> Option<Wallet> {
        self.wallets.get(address).map(|entry| entry.value().clone())
    }

    /// Gets a copy of the chain
    pub fn chain(&self) -> Vec<Block> {
        self.lock_state().chain.clone()
    }

    /// Gets the number of blocks, genesis included
    pub fn chain_len(&self) -> usize {
        self.lock_state().chain.len()
    }

    /// Gets the latest block
    pub fn last_block(&self) -> Block {
        self.lock_state().last_block().clone()
    }

    /// Gets a copy of the pending transactions in admission order
    pub fn transaction_pool(&self) -> Vec<Transaction> {
        self.lock_state().pool.snapshot()
    }

    /// Gets the chain and the pending pool as of one instant
    ///
    /// # Returns
    ///
    /// A `(chain, pool)` pair where the pool holds exactly the transactions
    /// not yet in the chain
    pub fn snapshot(&self) -> (Vec<Block>, Vec<Transaction>) {
        let state = self.lock_state();
        (state.chain.clone(), state.pool.snapshot())
    }

    /// Whether a mining run is in flight
    pub fn is_mining(&self) -> bool {
        self.mining_in_flight.load(Ordering::SeqCst)
    }
}
