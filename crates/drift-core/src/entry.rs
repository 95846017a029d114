//! File entries and metadata
//!
//! An entry binds a file's content reference to its metadata reference.
//! Both references share one width, declared by a leading flag byte so the
//! record stays self-describing: `0x00` for 32-byte plain references,
//! `0x01` for 64-byte encrypted references.

use crate::error::{CoreError, Result};
use drift_store::{Address, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE};
use serde::{Deserialize, Serialize};

const FLAG_PLAIN: u8 = 0x00;
const FLAG_ENCRYPTED: u8 = 0x01;

/// Per-file metadata stored as its own chunk tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Original file name
    pub filename: String,
    /// Content type of the file data
    pub mime_type: String,
}

impl Metadata {
    /// Create metadata for a file
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode as self-describing bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A binary record binding content to its metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    reference: Address,
    metadata: Address,
}

impl Entry {
    /// Bind a file reference to its metadata reference.
    ///
    /// Both references must have the same width; encryption applies to the
    /// whole transitive closure or not at all.
    pub fn new(reference: Address, metadata: Address) -> Result<Self> {
        if reference.len() != metadata.len() {
            return Err(CoreError::Entry(format!(
                "file reference is {} bytes but metadata reference is {}",
                reference.len(),
                metadata.len()
            )));
        }
        if reference.len() != HASH_SIZE && reference.len() != ENCRYPTED_REFERENCE_SIZE {
            return Err(CoreError::Entry(format!(
                "reference width {} is neither plain nor encrypted",
                reference.len()
            )));
        }
        Ok(Self {
            reference,
            metadata,
        })
    }

    /// The file content reference
    pub fn reference(&self) -> &Address {
        &self.reference
    }

    /// The metadata reference
    pub fn metadata(&self) -> &Address {
        &self.metadata
    }

    /// Serialize: flag byte followed by both references back-to-back
    pub fn to_bytes(&self) -> Vec<u8> {
        let flag = if self.reference.is_encrypted_reference() {
            FLAG_ENCRYPTED
        } else {
            FLAG_PLAIN
        };
        let mut bytes = Vec::with_capacity(1 + self.reference.len() + self.metadata.len());
        bytes.push(flag);
        bytes.extend_from_slice(self.reference.as_bytes());
        bytes.extend_from_slice(self.metadata.as_bytes());
        bytes
    }

    /// Deserialize from the binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let width = match bytes.first() {
            Some(&FLAG_PLAIN) => HASH_SIZE,
            Some(&FLAG_ENCRYPTED) => ENCRYPTED_REFERENCE_SIZE,
            Some(flag) => {
                return Err(CoreError::Entry(format!("unknown width flag {flag:#04x}")))
            }
            None => return Err(CoreError::Entry("empty entry record".to_string())),
        };
        if bytes.len() != 1 + 2 * width {
            return Err(CoreError::Entry(format!(
                "entry record of {} bytes does not fit two {}-byte references",
                bytes.len(),
                width
            )));
        }
        Ok(Self {
            reference: Address::new(bytes[1..1 + width].to_vec()),
            metadata: Address::new(bytes[1 + width..].to_vec()),
        })
    }
}
