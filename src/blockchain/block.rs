use chrono::Utc;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;

use super::transaction::{canonical_json, Transaction};

/// Errors that can occur when decoding block data
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
}

/// A SHA-256 digest, rendered as lowercase hex on the wire
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero digest used as the genesis block's predecessor
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, BlockError> {
        let bytes = hex::decode(value).map_err(|e| BlockError::InvalidHash(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BlockError::InvalidHash(format!("expected 32 bytes: {}", value)))?;

        Ok(Hash(bytes))
    }

    /// Number of leading zero characters in the hex rendering
    pub fn leading_zero_digits(&self) -> usize {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 2;
                continue;
            }
            if byte < 0x10 {
                zeros += 1;
            }
            break;
        }
        zeros
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Hash::from_hex(&value).map_err(de::Error::custom)
    }
}

/// Borrowed view of a block's hashed fields, in canonical order
#[derive(Serialize)]
struct BlockEncoding<'a> {
    nonce: u64,
    previous_hash: &'a Hash,
    timestamp: i64,
    transactions: &'a [Transaction],
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Proof of work (nonce)
    nonce: u64,

    /// Hash of the previous block
    previous_hash: Hash,

    /// Creation time in Unix nanoseconds
    timestamp: i64,

    /// Transactions in the order they were pooled
    transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a new block stamped with the current time
    pub fn new(nonce: u64, previous_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Block {
            nonce,
            previous_hash,
            timestamp: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            transactions,
        }
    }

    /// The first block of every chain
    pub fn genesis() -> Self {
        Block::new(0, Hash::zero(), Vec::new())
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Calculates the SHA-256 hash of the block's canonical encoding
    pub fn hash(&self) -> Hash {
        Block::digest(self.nonce, &self.previous_hash, self.timestamp, &self.transactions)
    }

    /// Hashes block fields without materializing a block
    pub fn digest(
        nonce: u64,
        previous_hash: &Hash,
        timestamp: i64,
        transactions: &[Transaction],
    ) -> Hash {
        let encoding = BlockEncoding {
            nonce,
            previous_hash,
            timestamp,
            transactions,
        };

        Hash(Sha256::digest(canonical_json(&encoding)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Address;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::with_timestamp(Address::from("alice"), Address::from("bob"), 1.25, 10),
            Transaction::with_timestamp(Address::from("bob"), Address::from("carol"), 0.5, 11),
        ]
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();

        assert_eq!(genesis.nonce(), 0);
        assert_eq!(genesis.previous_hash(), &Hash::zero());
        assert!(genesis.transactions().is_empty());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = Block::new(7, Hash::zero(), sample_transactions());

        assert_eq!(block.hash(), block.clone().hash());
        assert_eq!(block.hash().to_hex().len(), 64);
    }

    #[test]
    fn test_transaction_order_changes_hash() {
        let transactions = sample_transactions();
        let block = Block::new(1, Hash::zero(), transactions.clone());

        let mut reversed = transactions;
        reversed.reverse();
        let reordered = Block::digest(1, &Hash::zero(), block.timestamp(), &reversed);

        assert_ne!(block.hash(), reordered);
    }

    #[test]
    fn test_serialization_round_trip() {
        let previous = Block::genesis().hash();
        let block = Block::new(42, previous, sample_transactions());

        let json = serde_json::to_string(&block).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["previous_hash"], previous.to_hex());
        assert_eq!(value["nonce"], 42);

        let decoded: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn test_rejects_short_previous_hash() {
        let json = r#"{"nonce":1,"previous_hash":"abcd","timestamp":0,"transactions":[]}"#;
        assert!(serde_json::from_str::<Block>(json).is_err());
    }

    #[test]
    fn test_leading_zero_digits() {
        let mut bytes = [0xffu8; 32];
        assert_eq!(Hash::from_bytes(bytes).leading_zero_digits(), 0);

        bytes[0] = 0x0f;
        assert_eq!(Hash::from_bytes(bytes).leading_zero_digits(), 1);

        bytes[0] = 0x00;
        bytes[1] = 0x01;
        assert_eq!(Hash::from_bytes(bytes).leading_zero_digits(), 3);

        assert_eq!(Hash::zero().leading_zero_digits(), 64);
    }
}
