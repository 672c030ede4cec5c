use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;

use super::transaction::Transaction;

/// Version byte prepended to the public key hash before Base58Check encoding
const ADDRESS_VERSION: u8 = 0x00;

/// Length of an uncompressed public key without its SEC1 tag (X || Y)
const PUBLIC_KEY_LEN: usize = 64;

/// Length of a compact signature (R || S)
const SIGNATURE_LEN: usize = 64;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A blockchain address.
///
/// Addresses are opaque strings as far as the ledger is concerned. Locally
/// generated wallets derive theirs from the public key, but external
/// addresses (and the reserved mining-reward sender) are never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Derives an address from a public key:
    /// Base58Check(version || RIPEMD160(SHA256(X || Y)))
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let sha = Sha256::digest(public_key.to_bytes());
        let ripemd = Ripemd160::digest(sha);

        let mut payload = Vec::with_capacity(1 + ripemd.len() + 4);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&ripemd);

        let checksum = Sha256::digest(Sha256::digest(&payload));
        payload.extend_from_slice(&checksum[..4]);

        Address(bs58::encode(payload).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address(value)
    }
}

/// A secp256k1 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parses the 128 hex character wire form (X || Y)
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }

        let mut sec1 = Vec::with_capacity(PUBLIC_KEY_LEN + 1);
        sec1.push(0x04);
        sec1.extend_from_slice(&bytes);

        VerifyingKey::from_sec1_bytes(&sec1)
            .map(PublicKey)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Uncompressed point coordinates without the SEC1 tag
    pub fn to_bytes(&self) -> Vec<u8> {
        let point = self.0.to_encoded_point(false);
        point.as_bytes()[1..].to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Verifies an ECDSA signature over `message` (hashed with SHA-256)
    pub fn verify(&self, message: &[u8], signature: &TransactionSignature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }
}

/// An ECDSA signature over a transaction's canonical encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSignature(Signature);

impl TransactionSignature {
    /// Parses the 128 hex character wire form (R || S)
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.len() != SIGNATURE_LEN {
            return Err(CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            )));
        }

        Signature::from_slice(&bytes)
            .map(TransactionSignature)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl fmt::Display for TransactionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A locally managed key pair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random key pair
    pub fn new() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Restores a wallet from a hex encoded 32 byte private key
    pub fn from_private_key_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey(*signing_key.verifying_key());
        let address = public_key.address();

        Wallet {
            signing_key,
            public_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> TransactionSignature {
        TransactionSignature(self.signing_key.sign(message))
    }

    /// Signs the canonical encoding of a transaction
    pub fn sign_transaction(&self, transaction: &Transaction) -> TransactionSignature {
        self.sign(&transaction.canonical_bytes())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticates a transaction against the public key its sender claims.
///
/// The key must derive to the transaction's sender address and the signature
/// must cover the transaction's canonical encoding.
pub fn verify_transaction_signature(
    public_key: &PublicKey,
    signature: &TransactionSignature,
    transaction: &Transaction,
) -> bool {
    if &public_key.address() != transaction.sender() {
        return false;
    }

    public_key.verify(&transaction.canonical_bytes(), signature)
}
