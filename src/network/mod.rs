// Network module
//
// Everything a ledger needs to reach its neighbors:
// - Peer messages and the chain fetch wire record
// - The peer client abstraction
// - HTTP and in-process transports
// - Bounded per-neighbor outbound queues

pub mod broadcast;
pub mod http;
pub mod local;
pub mod message;
pub mod peer;

pub use broadcast::Broadcaster;
pub use http::HttpPeerClient;
pub use local::LocalNetwork;
pub use message::{ChainResponse, PeerMessage};
pub use peer::{PeerClient, PeerError};
