//! Chunk and address types

use crate::error::{Result, StoreError};
use bytes::Bytes;
use drift_crypto::{keccak256, ChunkKey, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE, SPAN_SIZE};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum stored payload: span header plus one chunk of data
pub const MAX_PAYLOAD_SIZE: usize = SPAN_SIZE + drift_crypto::CHUNK_SIZE;

/// A byte-string identifier in the overlay address space.
///
/// Chunk addresses are 32 bytes; encrypted references are 64 bytes
/// (address followed by the decryption key). Peer overlay addresses reuse
/// the same type and may be shorter.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Bytes);

impl Address {
    /// Create an address from raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Parse an address from a hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| StoreError::InvalidAddress(e.to_string()))?;
        Ok(Self(Bytes::from(bytes)))
    }

    /// Render the address as hex
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the address in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the address is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is an encrypted reference (address ∥ key)
    pub fn is_encrypted_reference(&self) -> bool {
        self.0.len() == ENCRYPTED_REFERENCE_SIZE
    }

    /// Join a plain address with a decryption key into a 64-byte reference
    pub fn with_key(&self, key: &ChunkKey) -> Address {
        let mut bytes = Vec::with_capacity(self.0.len() + key.as_bytes().len());
        bytes.extend_from_slice(&self.0);
        bytes.extend_from_slice(key.as_bytes());
        Address::new(bytes)
    }

    /// Split an encrypted reference into its address and key parts
    pub fn split_key(&self) -> Result<(Address, ChunkKey)> {
        if !self.is_encrypted_reference() {
            return Err(StoreError::InvalidReferenceLength(self.0.len()));
        }
        let address = Address::new(self.0.slice(..HASH_SIZE));
        let key = ChunkKey::from_slice(&self.0[HASH_SIZE..])?;
        Ok((address, key))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for Address {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(Bytes::copy_from_slice(&bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Derive the content address of a stored payload
pub fn derive_address(payload: &[u8]) -> Address {
    Address::from(keccak256(payload))
}

/// An immutable content-addressed chunk
#[derive(Clone, Debug)]
pub struct Chunk {
    address: Address,
    data: Bytes,
    tag_uid: Option<u64>,
}

impl Chunk {
    /// Create a chunk from an address and its full stored payload
    pub fn new(address: Address, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            data: data.into(),
            tag_uid: None,
        }
    }

    /// Create a chunk whose address is derived from the payload
    pub fn content_addressed(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let address = derive_address(&data);
        Self {
            address,
            data,
            tag_uid: None,
        }
    }

    /// Attach the owning upload tag
    pub fn with_tag(mut self, tag_uid: u64) -> Self {
        self.tag_uid = Some(tag_uid);
        self
    }

    /// The chunk's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The full stored payload (span ∥ body)
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The owning upload tag, if any
    pub fn tag_uid(&self) -> Option<u64> {
        self.tag_uid
    }

    /// Whether the address matches the payload
    pub fn verify(&self) -> bool {
        derive_address(&self.data) == self.address
    }
}
