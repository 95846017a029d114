//! Error types for the drift-node crate

use drift_store::Address;
use thiserror::Error;

/// Result type alias using `NodeError`
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors that can occur in node services
#[derive(Error, Debug)]
pub enum NodeError {
    /// No peer in the overlay is closer to the address than this node
    #[error("no closest peer for {0}")]
    NoClosestPeer(Address),

    /// Peer transport failed while pushing or receiving a receipt
    #[error("transport error: {0}")]
    Transport(String),

    /// A debt would cross the disconnect threshold
    #[error("balance overdraw: peer {peer} would owe beyond {threshold}")]
    Overdraw { peer: Address, threshold: u64 },

    /// Persisted balance bytes are malformed
    #[error("malformed balance record for peer {0}")]
    MalformedBalance(Address),

    /// Chunk store error
    #[error("store error: {0}")]
    Store(#[from] drift_store::StoreError),
}
