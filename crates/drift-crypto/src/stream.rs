//! Counter-mode keystream built from the Keccak-256 sponge
//!
//! Keystream block `j` is `keccak256(key ∥ LE32(counter_start + j))`.
//! Encryption XORs the plaintext with the stream, so the transform is its
//! own inverse.

use crate::hashing::{keccak256, HASH_SIZE};
use crate::keys::{ChunkKey, KEY_LENGTH};

/// Produce `len` keystream bytes for `key` starting at `counter_start`
pub fn keystream(key: &ChunkKey, counter_start: u32, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len.next_multiple_of(HASH_SIZE));
    let mut input = [0u8; KEY_LENGTH + 4];
    input[..KEY_LENGTH].copy_from_slice(key.as_bytes());
    let blocks = len.div_ceil(HASH_SIZE);
    for j in 0..blocks {
        let counter = counter_start.wrapping_add(j as u32);
        input[KEY_LENGTH..].copy_from_slice(&counter.to_le_bytes());
        out.extend_from_slice(&keccak256(input));
    }
    out.truncate(len);
    out
}

/// XOR transform over a fixed counter window
#[derive(Clone, Debug)]
pub struct KeystreamCipher {
    key: ChunkKey,
    counter_start: u32,
}

impl KeystreamCipher {
    /// Create a cipher whose keystream counter begins at `counter_start`
    pub fn new(key: ChunkKey, counter_start: u32) -> Self {
        Self { key, counter_start }
    }

    /// XOR `data` with the keystream; encrypt and decrypt are the same call
    pub fn transform(&self, data: &[u8]) -> Vec<u8> {
        let stream = keystream(&self.key, self.counter_start, data.len());
        data.iter().zip(stream).map(|(b, s)| b ^ s).collect()
    }

    /// XOR `data` in place with the keystream
    pub fn transform_in_place(&self, data: &mut [u8]) {
        let stream = keystream(&self.key, self.counter_start, data.len());
        for (b, s) in data.iter_mut().zip(stream) {
            *b ^= s;
        }
    }
}
