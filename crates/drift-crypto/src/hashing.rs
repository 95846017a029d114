//! Hashing utilities using Keccak-256
//!
//! This module provides the fixed 256-bit sponge used for:
//! - Content addressing (chunk address derivation)
//! - Keystream block generation for the chunk cipher
//! - ETag calculation at the HTTP boundary

use tiny_keccak::{Hasher, Keccak};

/// Size of a Keccak-256 hash output in bytes (256 bits)
pub const HASH_SIZE: usize = 32;

/// Type alias for hash output bytes
pub type HashOutput = [u8; HASH_SIZE];

/// Hash data with Keccak-256
pub fn keccak256(data: impl AsRef<[u8]>) -> HashOutput {
    let mut hasher = Keccak::v256();
    hasher.update(data.as_ref());
    let mut output = [0u8; HASH_SIZE];
    hasher.finalize(&mut output);
    output
}

/// An incremental Keccak-256 hasher for multi-part inputs
pub struct IncrementalHasher {
    inner: Keccak,
}

impl IncrementalHasher {
    /// Create a new empty hasher
    pub fn new() -> Self {
        Self {
            inner: Keccak::v256(),
        }
    }

    /// Feed more bytes into the hasher
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.inner.update(data.as_ref());
    }

    /// Consume the hasher and produce the digest
    pub fn finalize(self) -> HashOutput {
        let mut output = [0u8; HASH_SIZE];
        self.inner.finalize(&mut output);
        output
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}
