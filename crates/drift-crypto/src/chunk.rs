//! Chunk payload encryption
//!
//! A stored chunk payload is the 8-byte little-endian span followed by the
//! chunk body. Span and body are sealed independently under the same key:
//! the span with a single keystream block at counter 0, the body with a
//! keystream whose counter starts at `CHUNK_SIZE`. Bodies are padded to
//! `CHUNK_SIZE` with random bytes before the XOR so ciphertext length never
//! reveals content length; the decrypted span drives truncation on the way
//! back.

use crate::error::{CryptoError, Result};
use crate::keys::ChunkKey;
use crate::stream::KeystreamCipher;
use crate::{CHUNK_SIZE, ENCRYPTED_REFERENCE_SIZE, SPAN_SIZE};
use rand::rngs::OsRng;
use rand::RngCore;

fn span_cipher(key: &ChunkKey) -> KeystreamCipher {
    KeystreamCipher::new(*key, 0)
}

fn data_cipher(key: &ChunkKey) -> KeystreamCipher {
    KeystreamCipher::new(*key, CHUNK_SIZE as u32)
}

/// Number of plaintext body bytes a chunk with the given span carries.
///
/// A span at most `CHUNK_SIZE` marks a leaf carrying the span itself in
/// bytes. Larger spans mark interior chunks; the reference count collapses
/// level by level until the payload length of this chunk remains.
pub fn plaintext_payload_len(span: u64) -> usize {
    let mut length = span;
    while length > CHUNK_SIZE as u64 {
        length = length.div_ceil(CHUNK_SIZE as u64) * ENCRYPTED_REFERENCE_SIZE as u64;
    }
    length as usize
}

/// Seal a chunk payload under `key`.
///
/// `span` is the 8-byte little-endian span header and `data` the plaintext
/// body (at most `CHUNK_SIZE` bytes). The returned payload is always
/// `SPAN_SIZE + CHUNK_SIZE` bytes.
pub fn encrypt_chunk_payload(span: [u8; SPAN_SIZE], data: &[u8], key: &ChunkKey) -> Result<Vec<u8>> {
    if data.len() > CHUNK_SIZE {
        return Err(CryptoError::InvalidCiphertext(format!(
            "chunk body of {} bytes exceeds {}",
            data.len(),
            CHUNK_SIZE
        )));
    }

    let mut padded = vec![0u8; CHUNK_SIZE];
    padded[..data.len()].copy_from_slice(data);
    OsRng.fill_bytes(&mut padded[data.len()..]);
    data_cipher(key).transform_in_place(&mut padded);

    let mut payload = Vec::with_capacity(SPAN_SIZE + CHUNK_SIZE);
    payload.extend_from_slice(&span_cipher(key).transform(&span));
    payload.extend_from_slice(&padded);
    Ok(payload)
}

/// Open a sealed chunk payload, truncating padding via the decrypted span.
///
/// Returns the plaintext payload (`span ∥ body`).
pub fn decrypt_chunk_payload(payload: &[u8], key: &ChunkKey) -> Result<Vec<u8>> {
    if payload.len() < SPAN_SIZE {
        return Err(CryptoError::InvalidCiphertext(format!(
            "payload of {} bytes is shorter than the span header",
            payload.len()
        )));
    }

    let span = span_cipher(key).transform(&payload[..SPAN_SIZE]);
    let body = data_cipher(key).transform(&payload[SPAN_SIZE..]);

    let length = u64::from_le_bytes(span[..SPAN_SIZE].try_into().expect("span is 8 bytes"));
    let body_len = plaintext_payload_len(length);
    if body_len > body.len() {
        return Err(CryptoError::InvalidCiphertext(format!(
            "span claims {} body bytes but payload carries {}",
            body_len,
            body.len()
        )));
    }

    let mut plain = Vec::with_capacity(SPAN_SIZE + body_len);
    plain.extend_from_slice(&span);
    plain.extend_from_slice(&body[..body_len]);
    Ok(plain)
}
