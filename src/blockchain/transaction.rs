use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::{Address, CryptoError, PublicKey, TransactionSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Missing or invalid fields in transaction request")]
    MissingFields,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Represents a value transfer between two addresses.
///
/// Field order is significant: it is the canonical encoding used both for
/// signing and, inside a block, for hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "sender_blockchain_address")]
    sender: Address,

    #[serde(rename = "recipient_blockchain_address")]
    recipient: Address,

    value: f64,

    /// Creation time in Unix seconds
    timestamp: i64,
}

impl Transaction {
    /// Creates a new transaction stamped with the current time
    pub fn new(sender: Address, recipient: Address, value: f64) -> Self {
        Self::with_timestamp(sender, recipient, value, Utc::now().timestamp())
    }

    /// Creates a transaction with an explicit timestamp, e.g. the one the
    /// signer used
    pub fn with_timestamp(sender: Address, recipient: Address, value: f64, timestamp: i64) -> Self {
        Transaction {
            sender,
            recipient,
            value,
            timestamp,
        }
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Deterministic byte encoding used for signing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_json(self)
    }
}

/// Serializes a value to its canonical JSON form.
///
/// Only used for plain data structs whose `Serialize` impls cannot fail.
pub(crate) fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical encoding of plain data cannot fail")
}

/// Wire-format transaction submission.
///
/// Used both by clients submitting a signed transaction and by peers
/// propagating one they already accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub sender_blockchain_address: Option<String>,
    pub recipient_blockchain_address: Option<String>,
    pub sender_public_key: Option<String>,
    #[serde(default)]
    pub value: f64,
    pub signature: Option<String>,

    /// Timestamp the signer stamped on the transaction. Requests without one
    /// are stamped on arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl TransactionRequest {
    /// Checks that every required field is present and the value is positive
    pub fn validate(&self) -> bool {
        self.sender_blockchain_address.is_some()
            && self.recipient_blockchain_address.is_some()
            && self.sender_public_key.is_some()
            && self.signature.is_some()
            && self.value > 0.0
    }

    /// Validates the request and decodes its key material
    pub fn into_signed(self) -> Result<SignedTransaction, TransactionError> {
        if !self.validate() {
            return Err(TransactionError::MissingFields);
        }

        let (sender, recipient, public_key, signature) = match (
            self.sender_blockchain_address,
            self.recipient_blockchain_address,
            self.sender_public_key,
            self.signature,
        ) {
            (Some(sender), Some(recipient), Some(public_key), Some(signature)) => {
                (sender, recipient, public_key, signature)
            }
            _ => return Err(TransactionError::MissingFields),
        };

        let public_key = PublicKey::from_hex(&public_key)?;
        let signature = TransactionSignature::from_hex(&signature)?;

        let transaction = match self.timestamp {
            Some(timestamp) => {
                Transaction::with_timestamp(sender.into(), recipient.into(), self.value, timestamp)
            }
            None => Transaction::new(sender.into(), recipient.into(), self.value),
        };

        Ok(SignedTransaction {
            transaction,
            public_key,
            signature,
        })
    }
}

/// A transaction together with the key and signature that authenticate it
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    transaction: Transaction,
    public_key: PublicKey,
    signature: TransactionSignature,
}

impl SignedTransaction {
    /// Builds and signs a transfer from `wallet` to `recipient`
    pub fn sign(wallet: &Wallet, recipient: Address, value: f64) -> Self {
        let transaction = Transaction::new(wallet.address().clone(), recipient, value);
        let signature = wallet.sign_transaction(&transaction);

        SignedTransaction {
            transaction,
            public_key: *wallet.public_key(),
            signature,
        }
    }

    pub fn new(transaction: Transaction, public_key: PublicKey, signature: TransactionSignature) -> Self {
        SignedTransaction {
            transaction,
            public_key,
            signature,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn signature(&self) -> &TransactionSignature {
        &self.signature
    }

    /// Wire form forwarded to neighbors, carrying the original timestamp so
    /// the signature still verifies on arrival
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest {
            sender_blockchain_address: Some(self.transaction.sender.0.clone()),
            recipient_blockchain_address: Some(self.transaction.recipient.0.clone()),
            sender_public_key: Some(self.public_key.to_hex()),
            value: self.transaction.value,
            signature: Some(self.signature.to_hex()),
            timestamp: Some(self.transaction.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_request() -> (Wallet, TransactionRequest) {
        let wallet = Wallet::new();
        let signed = SignedTransaction::sign(&wallet, Address::from("recipient"), 2.5);
        (wallet, signed.to_request())
    }

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new(Address::from("alice"), Address::from("bob"), 10.5);

        assert_eq!(transaction.sender().as_str(), "alice");
        assert_eq!(transaction.recipient().as_str(), "bob");
        assert_eq!(transaction.value(), 10.5);
        assert!(transaction.timestamp() > 0);
    }

    #[test]
    fn test_canonical_encoding_field_order() {
        let transaction = Transaction::with_timestamp(Address::from("a"), Address::from("b"), 1.5, 42);
        let encoded = String::from_utf8(transaction.canonical_bytes()).unwrap();

        assert_eq!(
            encoded,
            r#"{"sender_blockchain_address":"a","recipient_blockchain_address":"b","value":1.5,"timestamp":42}"#
        );
    }

    #[test]
    fn test_request_validation() {
        let (_, request) = signed_request();
        assert!(request.validate());

        let mut missing_key = request.clone();
        missing_key.sender_public_key = None;
        assert!(!missing_key.validate());

        let mut missing_signature = request.clone();
        missing_signature.signature = None;
        assert!(!missing_signature.validate());

        let mut zero_value = request.clone();
        zero_value.value = 0.0;
        assert!(!zero_value.validate());

        let mut negative_value = request;
        negative_value.value = -1.0;
        assert!(matches!(
            negative_value.into_signed(),
            Err(TransactionError::MissingFields)
        ));
    }

    #[test]
    fn test_request_round_trip_preserves_transaction() {
        let wallet = Wallet::new();
        let signed = SignedTransaction::sign(&wallet, Address::from("recipient"), 4.0);

        let json = serde_json::to_string(&signed.to_request()).unwrap();
        let request: TransactionRequest = serde_json::from_str(&json).unwrap();
        let decoded = request.into_signed().unwrap();

        assert_eq!(decoded.transaction(), signed.transaction());
        assert_eq!(decoded.public_key(), wallet.public_key());
        assert_eq!(decoded.signature(), signed.signature());
    }

    #[test]
    fn test_request_with_bad_key_material() {
        let (_, mut request) = signed_request();
        request.signature = Some("not-hex".to_string());

        assert!(matches!(
            request.into_signed(),
            Err(TransactionError::CryptoError(_))
        ));
    }
}
