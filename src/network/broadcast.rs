use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

use std::sync::Arc;
use std::time::Duration;

use super::message::PeerMessage;
use super::peer::{PeerClient, PeerError};

/// Outbound notification queues, one per remote neighbor.
///
/// Enqueueing never blocks and never fails the caller: a full or closed
/// queue drops the message with a warning. Each queue is drained by its own
/// worker task which logs delivery failures and moves on without retrying.
#[derive(Debug, Default)]
pub struct Broadcaster {
    queues: Vec<(String, Sender<PeerMessage>)>,
}

impl Broadcaster {
    /// A broadcaster with no neighbors; every broadcast is a no-op
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Spawns one delivery worker per neighbor on the current tokio runtime
    pub fn spawn(
        neighbors: &[String],
        client: Arc<dyn PeerClient>,
        capacity: usize,
        timeout: Duration,
    ) -> Self {
        let queues = neighbors
            .iter()
            .map(|neighbor| {
                let (sender, receiver) = mpsc::channel(capacity.max(1));
                tokio::spawn(deliver_loop(
                    neighbor.clone(),
                    receiver,
                    Arc::clone(&client),
                    timeout,
                ));
                (neighbor.clone(), sender)
            })
            .collect();

        Broadcaster { queues }
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|(neighbor, _)| neighbor.as_str())
    }

    /// Queues `message` for every neighbor
    pub fn broadcast(&self, message: PeerMessage) {
        for (neighbor, queue) in &self.queues {
            match queue.try_send(message.clone()) {
                Ok(()) => debug!("Queued {} for {}", message.kind(), neighbor),
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue to {} is full, dropping {}", neighbor, message.kind())
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Outbound queue to {} is closed, dropping {}", neighbor, message.kind())
                }
            }
        }
    }
}

async fn deliver_loop(
    neighbor: String,
    mut receiver: Receiver<PeerMessage>,
    client: Arc<dyn PeerClient>,
    timeout: Duration,
) {
    while let Some(message) = receiver.recv().await {
        let result = tokio::time::timeout(timeout, client.deliver(&neighbor, &message))
            .await
            .unwrap_or_else(|_| Err(PeerError::Timeout(neighbor.clone())));

        match result {
            Ok(()) => info!("Sent {} to {}", message.kind(), neighbor),
            Err(err) => error!("Failed to send {} to {}: {}", message.kind(), neighbor, err),
        }
    }
    debug!("Outbound worker for {} stopped", neighbor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Block;
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;

    struct RecordingClient {
        delivered: UnboundedSender<(String, PeerMessage)>,
        failing: Option<String>,
    }

    #[async_trait]
    impl PeerClient for RecordingClient {
        async fn fetch_chain(&self, neighbor: &str) -> Result<Vec<Block>, PeerError> {
            Err(PeerError::UnknownPeer(neighbor.to_string()))
        }

        async fn deliver(&self, neighbor: &str, message: &PeerMessage) -> Result<(), PeerError> {
            if self.failing.as_deref() == Some(neighbor) {
                return Err(PeerError::UnknownPeer(neighbor.to_string()));
            }
            let _ = self.delivered.send((neighbor.to_string(), message.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivers_to_every_neighbor() {
        let (sender, mut delivered) = mpsc::unbounded_channel();
        let client = Arc::new(RecordingClient {
            delivered: sender,
            failing: Some("b:1".to_string()),
        });
        let neighbors = vec!["a:1".to_string(), "b:1".to_string(), "c:1".to_string()];
        let broadcaster = Broadcaster::spawn(&neighbors, client, 8, Duration::from_secs(1));

        broadcaster.broadcast(PeerMessage::ClearPool);
        broadcaster.broadcast(PeerMessage::ResolveConsensus);

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(delivered.recv().await.unwrap());
        }
        received.sort_by(|a, b| a.0.cmp(&b.0));

        // b fails silently, a and c each get both messages in order
        assert_eq!(
            received,
            vec![
                ("a:1".to_string(), PeerMessage::ClearPool),
                ("a:1".to_string(), PeerMessage::ResolveConsensus),
                ("c:1".to_string(), PeerMessage::ClearPool),
                ("c:1".to_string(), PeerMessage::ResolveConsensus),
            ]
        );
    }

    #[test]
    fn test_disabled_broadcast_is_noop() {
        let broadcaster = Broadcaster::disabled();
        broadcaster.broadcast(PeerMessage::ClearPool);
        assert_eq!(broadcaster.neighbors().count(), 0);
    }
}
