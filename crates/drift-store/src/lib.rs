//! # Drift Store
//!
//! Chunk storage layer for the Drift decentralized storage network.
//!
//! This crate provides:
//! - **Chunk primitives**: addresses, references, content-addressed chunks
//! - **Store contract**: put/get/set with modes plus a push-index
//!   subscription for the background pusher
//! - **In-memory store**: concurrency-safe, insertion-ordered push index
//! - **Decrypting adapter**: a get-side decorator that resolves 64-byte
//!   encrypted references transparently
//! - **State store**: small keyed blobs for node-local state (balances)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Splitter / Joiner / Pusher      │
//! ├─────────────────────────────────────────┤
//! │            ChunkStore Trait             │
//! ├──────────────────┬──────────────────────┤
//! │ MemoryChunkStore │ DecryptingStore<S>   │
//! └──────────────────┴──────────────────────┘
//! ```

pub mod chunk;
pub mod decrypt;
pub mod error;
pub mod memory;
pub mod state;

pub use chunk::{derive_address, Address, Chunk, MAX_PAYLOAD_SIZE};
pub use decrypt::DecryptingStore;
pub use error::{Result, StoreError};
pub use memory::MemoryChunkStore;
pub use state::{MemoryStateStore, StateStore};

pub use drift_crypto::{CHUNK_SIZE, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE, KEY_LENGTH, SPAN_SIZE};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// How a chunk enters the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModePut {
    /// Locally uploaded content; joins the push index
    Upload,
    /// Content received from the overlay; already at rest
    Sync,
}

/// Why a chunk is being read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeGet {
    /// Serving a client request
    Request,
    /// Internal lookup (manifest traversal, push worker)
    Lookup,
}

/// State transition applied to a stored chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeSet {
    /// The chunk has been handed to the push pipeline
    Push,
    /// A receipt confirmed remote custody
    SyncPush,
}

/// Lifecycle of a locally uploaded chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Stored locally, awaiting push
    Uploaded,
    /// Dispatched at least once
    Pushed,
    /// Receipt received; eligible for eviction
    Synced,
}

/// Guard for an active push-index subscription; dropping it unsubscribes.
pub struct PushSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl PushSubscription {
    /// Build a subscription guard from an unsubscribe closure
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Tear the subscription down explicitly
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

/// Trait for chunk storage backends
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a chunk; storing an existing address is a no-op
    async fn put(&self, mode: ModePut, chunk: Chunk) -> Result<()>;

    /// Retrieve a chunk by address
    async fn get(&self, mode: ModeGet, address: &Address) -> Result<Chunk>;

    /// Transition a stored chunk's state
    async fn set(&self, mode: ModeSet, address: &Address) -> Result<()>;

    /// Subscribe to the push index.
    ///
    /// Emits every currently unsynced chunk in insertion order, then keeps
    /// forwarding newly uploaded chunks until the guard is dropped.
    fn subscribe_push(&self) -> (mpsc::Receiver<Chunk>, PushSubscription);
}

#[async_trait]
impl<T: ChunkStore + ?Sized> ChunkStore for Arc<T> {
    async fn put(&self, mode: ModePut, chunk: Chunk) -> Result<()> {
        (**self).put(mode, chunk).await
    }

    async fn get(&self, mode: ModeGet, address: &Address) -> Result<Chunk> {
        (**self).get(mode, address).await
    }

    async fn set(&self, mode: ModeSet, address: &Address) -> Result<()> {
        (**self).set(mode, address).await
    }

    fn subscribe_push(&self) -> (mpsc::Receiver<Chunk>, PushSubscription) {
        (**self).subscribe_push()
    }
}
