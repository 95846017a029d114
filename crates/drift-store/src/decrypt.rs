//! Decrypting store adapter
//!
//! A decorator over any [`ChunkStore`] that resolves encrypted references
//! on `get`: a 32-byte address passes straight through, a 64-byte reference
//! is split into address and key, fetched by the address, and the payload
//! opened with the key. The returned chunk advertises the plain 32-byte
//! address. All other operations pass through unchanged.

use crate::chunk::{Address, Chunk};
use crate::error::{Result, StoreError};
use crate::{ChunkStore, ModeGet, ModePut, ModeSet, PushSubscription, HASH_SIZE};
use async_trait::async_trait;
use drift_crypto::decrypt_chunk_payload;
use tokio::sync::mpsc;

/// Get-side decrypting decorator
#[derive(Clone)]
pub struct DecryptingStore<S> {
    inner: S,
}

impl<S> DecryptingStore<S> {
    /// Wrap a store
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ChunkStore> ChunkStore for DecryptingStore<S> {
    async fn put(&self, mode: ModePut, chunk: Chunk) -> Result<()> {
        self.inner.put(mode, chunk).await
    }

    async fn get(&self, mode: ModeGet, address: &Address) -> Result<Chunk> {
        match address.len() {
            HASH_SIZE => self.inner.get(mode, address).await,
            len if address.is_encrypted_reference() => {
                debug_assert_eq!(len, crate::ENCRYPTED_REFERENCE_SIZE);
                let (plain, key) = address.split_key()?;
                let sealed = self.inner.get(mode, &plain).await?;
                let payload = decrypt_chunk_payload(sealed.data(), &key)?;
                Ok(Chunk::new(plain, payload))
            }
            len => Err(StoreError::InvalidReferenceLength(len)),
        }
    }

    async fn set(&self, mode: ModeSet, address: &Address) -> Result<()> {
        self.inner.set(mode, address).await
    }

    fn subscribe_push(&self) -> (mpsc::Receiver<Chunk>, PushSubscription) {
        self.inner.subscribe_push()
    }
}
