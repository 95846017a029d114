//! Per-chunk symmetric keys
//!
//! Every encrypted chunk is sealed under a freshly drawn 32-byte key. The
//! key travels inside the 64-byte reference (`address ∥ key`), so no key
//! store is needed on the read path.

use crate::{CryptoError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a chunk encryption key in bytes
pub const KEY_LENGTH: usize = 32;

/// A symmetric chunk encryption key
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkKey([u8; KEY_LENGTH]);

impl ChunkKey {
    /// Create a key from raw bytes
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh random key from the system RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Draw a key from the provided RNG (deterministic in tests)
    pub fn generate_with<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a key from a byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKey(format!(
                "key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut arr = [0u8; KEY_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Keys never appear in logs in full.
impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkKey({}..)", hex::encode(&self.0[..4]))
    }
}

impl AsRef<[u8]> for ChunkKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; KEY_LENGTH]> for ChunkKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generate_produces_distinct_keys() {
        assert_ne!(ChunkKey::generate(), ChunkKey::generate());
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = ChunkKey::generate_with(&mut StdRng::seed_from_u64(7));
        let b = ChunkKey::generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(ChunkKey::from_slice(&[0u8; 16]).is_err());
        assert!(ChunkKey::from_slice(&[0u8; 32]).is_ok());
    }
}
