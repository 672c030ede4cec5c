use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use std::time::Duration;

use crate::blockchain::Block;

use super::message::{ChainResponse, PeerMessage};
use super::peer::{PeerClient, PeerError};

/// Talks to neighbors over their REST endpoints:
///
/// * `GET /chain` returns a [`ChainResponse`]
/// * `PUT /transactions` receives a propagated transaction
/// * `DELETE /transactions` clears the pending pool
/// * `PUT /consensus` triggers conflict resolution
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    /// Creates a client whose requests each time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn endpoint(neighbor: &str, path: &str) -> String {
        if neighbor.starts_with("http://") || neighbor.starts_with("https://") {
            format!("{}{}", neighbor.trim_end_matches('/'), path)
        } else {
            format!("http://{}{}", neighbor, path)
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, neighbor: &str) -> Result<Vec<Block>, PeerError> {
        let response = self
            .client
            .get(Self::endpoint(neighbor, "/chain"))
            .send()
            .await?
            .error_for_status()?;

        let body: ChainResponse = response.json().await?;
        debug!("Fetched {} blocks from {}", body.chain.len(), neighbor);
        Ok(body.chain)
    }

    async fn deliver(&self, neighbor: &str, message: &PeerMessage) -> Result<(), PeerError> {
        let request = match message {
            PeerMessage::Transaction(transaction) => self
                .client
                .put(Self::endpoint(neighbor, "/transactions"))
                .json(transaction),
            PeerMessage::ClearPool => self.client.delete(Self::endpoint(neighbor, "/transactions")),
            PeerMessage::ResolveConsensus => self.client.put(Self::endpoint(neighbor, "/consensus")),
        };

        request.send().await?.error_for_status()?;
        Ok(())
    }
}
