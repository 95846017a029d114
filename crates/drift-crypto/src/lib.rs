//! # Drift Crypto
//!
//! Cryptographic primitives for the Drift decentralized storage network.
//!
//! This crate provides:
//! - **Content addressing**: Keccak-256 hashing over chunk payloads
//! - **Chunk encryption**: a counter-mode keystream built from the same
//!   sponge, XORed over the span header and data independently
//! - **Obfuscation**: the keystream reused to mask manifest node bytes
//!
//! Encryption is its own inverse (XOR with a deterministic keystream), so
//! `decrypt(encrypt(x, k), k) == x` holds for every payload.
//!
//! ## Example
//!
//! ```rust,ignore
//! use drift_crypto::{ChunkKey, encrypt_chunk_payload, decrypt_chunk_payload};
//!
//! let key = ChunkKey::generate();
//! let sealed = encrypt_chunk_payload(&span, &data, &key)?;
//! let plain = decrypt_chunk_payload(&sealed, &key)?;
//! ```

pub mod chunk;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod stream;

pub use chunk::{decrypt_chunk_payload, encrypt_chunk_payload, plaintext_payload_len};
pub use error::{CryptoError, Result};
pub use hashing::{keccak256, HashOutput, IncrementalHasher, HASH_SIZE};
pub use keys::{ChunkKey, KEY_LENGTH};
pub use stream::{keystream, KeystreamCipher};

/// Number of data bytes carried by a single chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Length of the little-endian span header prefixed to every chunk payload.
pub const SPAN_SIZE: usize = 8;

/// Width of an encrypted reference: chunk address followed by its key.
pub const ENCRYPTED_REFERENCE_SIZE: usize = HASH_SIZE + KEY_LENGTH;
