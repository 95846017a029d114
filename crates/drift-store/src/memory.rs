//! In-memory chunk store for testing and single-node operation

use crate::chunk::{Address, Chunk};
use crate::error::{Result, StoreError};
use crate::{ChunkState, ChunkStore, ModeGet, ModePut, ModeSet, PushSubscription, MAX_PAYLOAD_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const SUBSCRIPTION_BUFFER: usize = 64;

struct StoredChunk {
    data: Bytes,
    state: ChunkState,
    tag_uid: Option<u64>,
}

struct Inner {
    chunks: DashMap<Address, StoredChunk>,
    // Insertion order of uploaded chunks; the push index iterates this.
    order: Mutex<Vec<Address>>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Chunk>>>,
    next_subscriber: AtomicU64,
}

/// An in-memory chunk store with a live push-index subscription
#[derive(Clone)]
pub struct MemoryChunkStore {
    inner: Arc<Inner>,
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChunkStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                chunks: DashMap::new(),
                order: Mutex::new(Vec::new()),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    /// Number of chunks stored
    pub fn len(&self) -> usize {
        self.inner.chunks.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.chunks.is_empty()
    }

    /// Total size of all stored payloads
    pub fn total_size(&self) -> u64 {
        self.inner
            .chunks
            .iter()
            .map(|entry| entry.value().data.len() as u64)
            .sum()
    }

    /// Current lifecycle state of a chunk
    pub fn state_of(&self, address: &Address) -> Option<ChunkState> {
        self.inner.chunks.get(address).map(|e| e.value().state)
    }

    /// Whether the chunk may be evicted right away
    pub fn gc_eligible(&self, address: &Address) -> bool {
        self.state_of(address) == Some(ChunkState::Synced)
    }

    fn unsynced_snapshot(&self) -> Vec<Chunk> {
        let order = self.inner.order.lock();
        order
            .iter()
            .filter_map(|address| {
                self.inner.chunks.get(address).and_then(|entry| {
                    let stored = entry.value();
                    if stored.state == ChunkState::Synced {
                        return None;
                    }
                    let mut chunk = Chunk::new(address.clone(), stored.data.clone());
                    if let Some(uid) = stored.tag_uid {
                        chunk = chunk.with_tag(uid);
                    }
                    Some(chunk)
                })
            })
            .collect()
    }

    fn notify_subscribers(&self, chunk: &Chunk) {
        let subscribers = self.inner.subscribers.lock();
        for sender in subscribers.values() {
            // A full or closed subscriber just misses the live update; the
            // pusher's next resubscription pass covers it.
            let _ = sender.try_send(chunk.clone());
        }
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put(&self, mode: ModePut, chunk: Chunk) -> Result<()> {
        if chunk.size() > MAX_PAYLOAD_SIZE {
            return Err(StoreError::PayloadTooLarge {
                size: chunk.size(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if self.inner.chunks.contains_key(chunk.address()) {
            // Same address means same content; collisions are no-ops.
            return Ok(());
        }

        let state = match mode {
            ModePut::Upload => ChunkState::Uploaded,
            ModePut::Sync => ChunkState::Synced,
        };
        self.inner.chunks.insert(
            chunk.address().clone(),
            StoredChunk {
                data: chunk.data().clone(),
                state,
                tag_uid: chunk.tag_uid(),
            },
        );

        if mode == ModePut::Upload {
            self.inner.order.lock().push(chunk.address().clone());
            self.notify_subscribers(&chunk);
        }
        Ok(())
    }

    async fn get(&self, _mode: ModeGet, address: &Address) -> Result<Chunk> {
        let entry = self
            .inner
            .chunks
            .get(address)
            .ok_or_else(|| StoreError::NotFound(address.clone()))?;
        let stored = entry.value();
        let mut chunk = Chunk::new(address.clone(), stored.data.clone());
        if let Some(uid) = stored.tag_uid {
            chunk = chunk.with_tag(uid);
        }
        Ok(chunk)
    }

    async fn set(&self, mode: ModeSet, address: &Address) -> Result<()> {
        let mut entry = self
            .inner
            .chunks
            .get_mut(address)
            .ok_or_else(|| StoreError::NotFound(address.clone()))?;
        let stored = entry.value_mut();
        match mode {
            ModeSet::Push => {
                if stored.state == ChunkState::Uploaded {
                    stored.state = ChunkState::Pushed;
                }
            }
            ModeSet::SyncPush => stored.state = ChunkState::Synced,
        }
        Ok(())
    }

    fn subscribe_push(&self) -> (mpsc::Receiver<Chunk>, PushSubscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        // Register the live sender before snapshotting so no upload slips
        // between the two.
        self.inner.subscribers.lock().insert(id, tx.clone());
        let snapshot = self.unsynced_snapshot();

        tokio::spawn(async move {
            for chunk in snapshot {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        let subscription = PushSubscription::new(move || {
            inner.subscribers.lock().remove(&id);
        });
        (rx, subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::derive_address;

    fn chunk(body: &[u8]) -> Chunk {
        let mut payload = (body.len() as u64).to_le_bytes().to_vec();
        payload.extend_from_slice(body);
        Chunk::content_addressed(payload)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryChunkStore::new();
        let ch = chunk(b"hello");
        store.put(ModePut::Upload, ch.clone()).await.unwrap();

        let got = store.get(ModeGet::Request, ch.address()).await.unwrap();
        assert_eq!(got.data(), ch.data());
        assert_eq!(derive_address(got.data()), *got.address());
    }

    #[tokio::test]
    async fn missing_chunk_is_not_found() {
        let store = MemoryChunkStore::new();
        let address = Address::new(vec![0u8; 32]);
        assert!(matches!(
            store.get(ModeGet::Request, &address).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_put_is_noop() {
        let store = MemoryChunkStore::new();
        let ch = chunk(b"same");
        store.put(ModePut::Upload, ch.clone()).await.unwrap();
        store
            .set(ModeSet::SyncPush, ch.address())
            .await
            .unwrap();
        // A second put must not resurrect the chunk into the push index.
        store.put(ModePut::Upload, ch.clone()).await.unwrap();
        assert_eq!(store.state_of(ch.address()), Some(ChunkState::Synced));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn state_transitions() {
        let store = MemoryChunkStore::new();
        let ch = chunk(b"lifecycle");
        store.put(ModePut::Upload, ch.clone()).await.unwrap();
        assert_eq!(store.state_of(ch.address()), Some(ChunkState::Uploaded));
        assert!(!store.gc_eligible(ch.address()));

        store.set(ModeSet::Push, ch.address()).await.unwrap();
        assert_eq!(store.state_of(ch.address()), Some(ChunkState::Pushed));

        store.set(ModeSet::SyncPush, ch.address()).await.unwrap();
        assert_eq!(store.state_of(ch.address()), Some(ChunkState::Synced));
        assert!(store.gc_eligible(ch.address()));
    }

    #[tokio::test]
    async fn subscription_replays_then_follows() {
        let store = MemoryChunkStore::new();
        let first = chunk(b"first");
        let second = chunk(b"second");
        store.put(ModePut::Upload, first.clone()).await.unwrap();

        let (mut rx, subscription) = store.subscribe_push();
        let replayed = rx.recv().await.unwrap();
        assert_eq!(replayed.address(), first.address());

        store.put(ModePut::Upload, second.clone()).await.unwrap();
        let live = rx.recv().await.unwrap();
        assert_eq!(live.address(), second.address());

        subscription.unsubscribe();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn synced_chunks_leave_the_push_index() {
        let store = MemoryChunkStore::new();
        let done = chunk(b"done");
        let pending = chunk(b"pending");
        store.put(ModePut::Upload, done.clone()).await.unwrap();
        store.put(ModePut::Upload, pending.clone()).await.unwrap();
        store.set(ModeSet::SyncPush, done.address()).await.unwrap();

        let (mut rx, _subscription) = store.subscribe_push();
        let only = rx.recv().await.unwrap();
        assert_eq!(only.address(), pending.address());
    }

    #[tokio::test]
    async fn sync_mode_put_skips_the_push_index() {
        let store = MemoryChunkStore::new();
        let ch = chunk(b"from the overlay");
        store.put(ModePut::Sync, ch.clone()).await.unwrap();
        assert_eq!(store.state_of(ch.address()), Some(ChunkState::Synced));

        let (mut rx, subscription) = store.subscribe_push();
        subscription.unsubscribe();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn tag_travels_with_the_chunk() {
        let store = MemoryChunkStore::new();
        let ch = chunk(b"tagged").with_tag(42);
        store.put(ModePut::Upload, ch.clone()).await.unwrap();

        let got = store.get(ModeGet::Lookup, ch.address()).await.unwrap();
        assert_eq!(got.tag_uid(), Some(42));

        let (mut rx, _subscription) = store.subscribe_push();
        assert_eq!(rx.recv().await.unwrap().tag_uid(), Some(42));
    }
}
