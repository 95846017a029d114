//! Node-local state store
//!
//! Small keyed blobs that must survive restarts: peer balances, settings.
//! The accounting ledger persists balances under `accounting_<peer_hex>`
//! as 8-byte signed little-endian integers.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Trait for keyed state persistence
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value; `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, durably, before returning
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// An in-memory state store
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    /// Create a new empty state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}
