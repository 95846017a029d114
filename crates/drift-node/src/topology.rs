//! Peer transport contracts
//!
//! The overlay transport and topology discovery live below this crate;
//! node services only see these two interfaces. A receipt is the remote
//! peer's confirmation of custody for one chunk.

use crate::error::{NodeError, Result};
use async_trait::async_trait;
use drift_store::{Address, Chunk};

/// Confirmation that a peer took custody of a chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Address of the chunk the receipt covers
    pub address: Address,
}

/// Pushes chunks toward the peer closest to their address
#[async_trait]
pub trait PushSync: Send + Sync {
    /// Push a chunk to the closest peer and wait for its receipt
    async fn push_chunk_to_closest(&self, chunk: Chunk) -> Result<Receipt>;
}

/// Resolves the peer topologically closest to an address
#[async_trait]
pub trait Topology: Send + Sync {
    /// The closest known peer, or `NoClosestPeer` when the node is isolated
    async fn closest_peer(&self, address: &Address) -> Result<Address>;
}

/// Placeholder transport for a node without connected peers.
///
/// Every push reports `NoClosestPeer`, which the pusher treats as the
/// expected quiet case; chunks stay in the push index until a real
/// transport is wired in.
#[derive(Clone, Default)]
pub struct IsolatedNode;

#[async_trait]
impl PushSync for IsolatedNode {
    async fn push_chunk_to_closest(&self, chunk: Chunk) -> Result<Receipt> {
        Err(NodeError::NoClosestPeer(chunk.address().clone()))
    }
}

#[async_trait]
impl Topology for IsolatedNode {
    async fn closest_peer(&self, address: &Address) -> Result<Address> {
        Err(NodeError::NoClosestPeer(address.clone()))
    }
}
