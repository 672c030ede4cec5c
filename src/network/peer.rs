use async_trait::async_trait;
use thiserror::Error;

use crate::blockchain::Block;

use super::message::PeerMessage;

/// Errors that can occur while talking to a neighbor
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Peer {peer} rejected {kind}: {reason}")]
    Rejected {
        peer: String,
        kind: &'static str,
        reason: String,
    },

    #[error("Request to {0} timed out")]
    Timeout(String),
}

/// Transport used to reach neighbors.
///
/// `neighbor` is the configured `host:port` address of the peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetches the neighbor's full chain
    async fn fetch_chain(&self, neighbor: &str) -> Result<Vec<Block>, PeerError>;

    /// Delivers a notification to the neighbor
    async fn deliver(&self, neighbor: &str, message: &PeerMessage) -> Result<(), PeerError>;
}
