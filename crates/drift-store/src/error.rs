//! Error types for the drift-store crate

use crate::chunk::Address;
use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during chunk storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Chunk not found
    #[error("chunk not found: {0}")]
    NotFound(Address),

    /// Reference is neither a plain address nor an encrypted reference
    #[error("invalid reference length: {0} bytes")]
    InvalidReferenceLength(usize),

    /// Address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Chunk payload exceeds the wire maximum
    #[error("chunk payload of {size} bytes exceeds maximum {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// State key not present in the state store
    #[error("state entry not found: {0}")]
    StateNotFound(String),

    /// Crypto error
    #[error("crypto error: {0}")]
    Crypto(#[from] drift_crypto::CryptoError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
