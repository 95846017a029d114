//! Error types for the drift-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Ciphertext is malformed or too short
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Hash input or output has an unexpected length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    /// Hex decoding failed
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}
