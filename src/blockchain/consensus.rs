use log::{debug, error, info};

use std::sync::Arc;
use std::time::Duration;

use crate::network::{PeerClient, PeerError};

use super::block::Block;

/// A neighbor's chain chosen to replace the local one
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub neighbor: String,
    pub chain: Vec<Block>,
}

/// Longest-chain selection over candidates offered in neighbor order.
///
/// A candidate replaces the current best only if it is strictly longer, so
/// among equally long valid chains the first one offered wins.
#[derive(Debug)]
pub struct LongestChainSelector {
    max_length: usize,
    best: Option<Candidate>,
}

impl LongestChainSelector {
    /// Starts with the local chain length as the bar to beat
    pub fn new(local_length: usize) -> Self {
        LongestChainSelector {
            max_length: local_length,
            best: None,
        }
    }

    /// Offers a fetched chain. `is_valid` only runs for chains long enough
    /// to matter. Returns whether the candidate became the new best.
    pub fn offer<F>(&mut self, neighbor: &str, chain: Vec<Block>, is_valid: F) -> bool
    where
        F: FnOnce(&[Block]) -> bool,
    {
        if chain.len() <= self.max_length {
            debug!(
                "Chain from {} has {} blocks, not longer than {}",
                neighbor,
                chain.len(),
                self.max_length
            );
            return false;
        }

        if !is_valid(&chain) {
            info!("Discarding invalid chain from {}", neighbor);
            return false;
        }

        self.max_length = chain.len();
        self.best = Some(Candidate {
            neighbor: neighbor.to_string(),
            chain,
        });
        true
    }

    pub fn into_best(self) -> Option<Candidate> {
        self.best
    }
}

/// Queries neighbor ledgers for the longest valid chain
pub struct ConsensusResolver {
    neighbors: Vec<String>,
    peers: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl ConsensusResolver {
    pub fn new(neighbors: Vec<String>, peers: Arc<dyn PeerClient>, timeout: Duration) -> Self {
        ConsensusResolver {
            neighbors,
            peers,
            timeout,
        }
    }

    pub fn neighbors(&self) -> &[String] {
        &self.neighbors
    }

    /// Fetches every neighbor's chain in configured order and returns the
    /// longest one that beats `local_length` and passes `is_valid`.
    ///
    /// A neighbor that cannot be reached is skipped.
    pub async fn find_longest<F>(&self, local_length: usize, is_valid: F) -> Option<Candidate>
    where
        F: Fn(&[Block]) -> bool + Send + Sync,
    {
        let mut selector = LongestChainSelector::new(local_length);

        for neighbor in &self.neighbors {
            let fetched = tokio::time::timeout(self.timeout, self.peers.fetch_chain(neighbor))
                .await
                .unwrap_or_else(|_| Err(PeerError::Timeout(neighbor.clone())));

            match fetched {
                Ok(chain) => {
                    selector.offer(neighbor, chain, &is_valid);
                }
                Err(err) => error!("Failed to get chain from {}: {}", neighbor, err),
            }
        }

        selector.into_best()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Hash;
    use crate::network::PeerMessage;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn chain_of(length: usize) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        while chain.len() < length {
            let previous = chain[chain.len() - 1].hash();
            chain.push(Block::new(chain.len() as u64, previous, Vec::new()));
        }
        chain
    }

    struct StaticPeers {
        chains: HashMap<String, Vec<Block>>,
    }

    #[async_trait]
    impl PeerClient for StaticPeers {
        async fn fetch_chain(&self, neighbor: &str) -> Result<Vec<Block>, PeerError> {
            self.chains
                .get(neighbor)
                .cloned()
                .ok_or_else(|| PeerError::UnknownPeer(neighbor.to_string()))
        }

        async fn deliver(&self, _neighbor: &str, _message: &PeerMessage) -> Result<(), PeerError> {
            Ok(())
        }
    }

    #[test]
    fn test_selector_requires_strictly_longer() {
        let mut selector = LongestChainSelector::new(3);

        assert!(!selector.offer("a", chain_of(3), |_| true));
        assert!(!selector.offer("b", chain_of(2), |_| true));
        assert!(selector.into_best().is_none());
    }

    #[test]
    fn test_selector_skips_invalid_and_keeps_first_of_ties() {
        let mut selector = LongestChainSelector::new(1);

        assert!(!selector.offer("invalid", chain_of(9), |_| false));
        assert!(selector.offer("first", chain_of(4), |_| true));
        assert!(!selector.offer("tie", chain_of(4), |_| true));
        assert!(selector.offer("longer", chain_of(5), |_| true));

        let best = selector.into_best().unwrap();
        assert_eq!(best.neighbor, "longer");
        assert_eq!(best.chain.len(), 5);
    }

    #[test]
    fn test_selector_skips_validation_for_short_chains() {
        let mut selector = LongestChainSelector::new(4);
        let offered = selector.offer("short", chain_of(2), |_| panic!("validated a short chain"));
        assert!(!offered);
    }

    #[tokio::test]
    async fn test_find_longest_skips_unreachable_neighbors() {
        let mut chains = HashMap::new();
        chains.insert("b:1".to_string(), chain_of(4));
        chains.insert("c:1".to_string(), chain_of(4));
        let peers = Arc::new(StaticPeers { chains });

        let resolver = ConsensusResolver::new(
            vec!["missing:1".to_string(), "b:1".to_string(), "c:1".to_string()],
            peers,
            Duration::from_secs(1),
        );

        let best = resolver.find_longest(2, |_| true).await.unwrap();
        assert_eq!(best.neighbor, "b:1");

        assert!(resolver.find_longest(4, |_| true).await.is_none());
        assert_eq!(resolver.neighbors().len(), 3);
        assert_ne!(best.chain[1].previous_hash(), &Hash::zero());
    }
}
