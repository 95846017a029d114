//! Error types for the drift-core crate

use drift_store::Address;
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the file pipeline
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input stream did not match its declared length
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A chunk referenced by the tree is missing from the store
    #[error("incomplete chunk tree: missing {0}")]
    IncompleteTree(Address),

    /// A chunk's payload contradicts the shape its parent declared
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// Manifest path not present
    #[error("path not found")]
    NotFound,

    /// Manifest node bytes failed to decode
    #[error("malformed manifest node: {0}")]
    Manifest(String),

    /// Entry bytes failed to decode
    #[error("malformed entry: {0}")]
    Entry(String),

    /// Metadata encode/decode error
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Chunk store error
    #[error("store error: {0}")]
    Store(#[from] drift_store::StoreError),

    /// Crypto error
    #[error("crypto error: {0}")]
    Crypto(#[from] drift_crypto::CryptoError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
