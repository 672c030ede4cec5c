//! In-process transport for tests and single-process simulations.
//!
//! Routes calls directly to registered ledgers without network I/O.

use async_trait::async_trait;
use dashmap::DashMap;

use std::sync::{Arc, Weak};

use crate::blockchain::{Block, Blockchain};

use super::message::PeerMessage;
use super::peer::{PeerClient, PeerError};

/// Registry of ledgers reachable by address.
///
/// Holds weak references so ledgers that use this network as their own
/// transport do not keep each other alive.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    nodes: DashMap<String, Weak<Blockchain>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `ledger` reachable at `address`
    pub fn register(&self, address: &str, ledger: &Arc<Blockchain>) {
        self.nodes.insert(address.to_string(), Arc::downgrade(ledger));
    }

    /// Makes `address` unreachable
    pub fn unregister(&self, address: &str) {
        self.nodes.remove(address);
    }

    fn node(&self, address: &str) -> Result<Arc<Blockchain>, PeerError> {
        self.nodes
            .get(address)
            .and_then(|entry| entry.upgrade())
            .ok_or_else(|| PeerError::UnknownPeer(address.to_string()))
    }
}

#[async_trait]
impl PeerClient for LocalNetwork {
    async fn fetch_chain(&self, neighbor: &str) -> Result<Vec<Block>, PeerError> {
        Ok(self.node(neighbor)?.chain())
    }

    async fn deliver(&self, neighbor: &str, message: &PeerMessage) -> Result<(), PeerError> {
        let node = self.node(neighbor)?;
        let rejected = |reason: String| PeerError::Rejected {
            peer: neighbor.to_string(),
            kind: message.kind(),
            reason,
        };

        match message {
            PeerMessage::Transaction(request) => {
                let signed = request
                    .clone()
                    .into_signed()
                    .map_err(|e| rejected(e.to_string()))?;
                node.add_transaction(
                    signed.transaction().clone(),
                    Some(signed.public_key()),
                    Some(signed.signature()),
                )
                .map_err(|e| rejected(e.to_string()))?;
            }
            PeerMessage::ClearPool => node.clear_transaction_pool(),
            PeerMessage::ResolveConsensus => {
                node.resolve_conflicts().await;
            }
        }

        Ok(())
    }
}
