//! Chunk tree splitter
//!
//! Consumes a byte stream of declared length and produces a
//! content-addressed chunk tree in a single bottom-up pass. Data is read
//! `CHUNK_SIZE` bytes at a time; each block becomes a leaf chunk whose
//! payload is the 8-byte little-endian span followed by the data. Leaf
//! references accumulate per level; whenever a level reaches the branching
//! factor an interior chunk is emitted one level up, its span being the sum
//! of its children's spans. The last surviving reference is the root.
//!
//! With encryption enabled every chunk is sealed under a fresh key and the
//! reference widens to 64 bytes (`address ∥ key`), which halves the
//! branching factor.

use crate::error::{CoreError, Result};
use crate::tags::Tag;
use drift_crypto::{encrypt_chunk_payload, ChunkKey, CHUNK_SIZE, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE, SPAN_SIZE};
use drift_store::{Address, Chunk, ChunkStore, ModePut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Splits byte streams into chunk trees
pub struct Splitter<S> {
    store: S,
    mode: ModePut,
}

impl<S: ChunkStore> Splitter<S> {
    /// Create a splitter that stores chunks in upload mode
    pub fn new(store: S) -> Self {
        Self {
            store,
            mode: ModePut::Upload,
        }
    }

    /// Create a splitter with an explicit put mode
    pub fn with_mode(store: S, mode: ModePut) -> Self {
        Self { store, mode }
    }

    /// Split `reader` into a chunk tree and return the root reference.
    ///
    /// `length` is the declared byte count; the stream must carry exactly
    /// that many bytes or the split fails with `InvalidInput`. Chunks are
    /// counted against `tag` when given so the pusher can account them to
    /// their upload.
    pub async fn split<R>(
        &self,
        mut reader: R,
        length: u64,
        encrypt: bool,
        tag: Option<&Tag>,
    ) -> Result<Address>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut tree = TreeBuilder {
            store: &self.store,
            mode: self.mode,
            encrypt,
            tag,
            levels: Vec::new(),
        };

        if length == 0 {
            tree.emit_leaf(&[]).await?;
        } else {
            let mut remaining = length;
            let mut buf = vec![0u8; CHUNK_SIZE];
            while remaining > 0 {
                let take = remaining.min(CHUNK_SIZE as u64) as usize;
                reader
                    .read_exact(&mut buf[..take])
                    .await
                    .map_err(|e| match e.kind() {
                        std::io::ErrorKind::UnexpectedEof => CoreError::InvalidInput(format!(
                            "stream ended {remaining} bytes short of the declared length {length}"
                        )),
                        _ => CoreError::Io(e),
                    })?;
                tree.emit_leaf(&buf[..take]).await?;
                remaining -= take as u64;
            }
        }

        // The stream must be exhausted; trailing bytes mean the declared
        // length was wrong.
        let mut probe = [0u8; 1];
        if reader.read(&mut probe).await? != 0 {
            return Err(CoreError::InvalidInput(format!(
                "stream carries more than the declared length {length}"
            )));
        }

        tree.finish().await
    }
}

struct TreeBuilder<'a, S> {
    store: &'a S,
    mode: ModePut,
    encrypt: bool,
    tag: Option<&'a Tag>,
    // Pending (reference, span) pairs per tree level; level 0 are leaves.
    levels: Vec<Vec<(Address, u64)>>,
}

impl<S: ChunkStore> TreeBuilder<'_, S> {
    fn branching(&self) -> usize {
        CHUNK_SIZE / self.reference_length()
    }

    fn reference_length(&self) -> usize {
        if self.encrypt {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            HASH_SIZE
        }
    }

    async fn emit_leaf(&mut self, data: &[u8]) -> Result<()> {
        let span = data.len() as u64;
        let reference = self.store_chunk(span, data).await?;
        self.push(0, reference, span).await
    }

    /// Store one chunk with the given span and body; returns its reference.
    async fn store_chunk(&self, span: u64, body: &[u8]) -> Result<Address> {
        let span_bytes = span.to_le_bytes();
        let (payload, key) = if self.encrypt {
            let key = ChunkKey::generate();
            (encrypt_chunk_payload(span_bytes, body, &key)?, Some(key))
        } else {
            let mut payload = Vec::with_capacity(SPAN_SIZE + body.len());
            payload.extend_from_slice(&span_bytes);
            payload.extend_from_slice(body);
            (payload, None)
        };

        let mut chunk = Chunk::content_addressed(payload);
        if let Some(tag) = self.tag {
            chunk = chunk.with_tag(tag.uid());
            tag.inc_split();
        }
        let address = chunk.address().clone();
        self.store.put(self.mode, chunk).await?;
        if let Some(tag) = self.tag {
            tag.inc_stored();
        }
        trace!(address = %address, span, "stored chunk");

        Ok(match key {
            Some(key) => address.with_key(&key),
            None => address,
        })
    }

    /// Append a reference to `level`, cascading full levels upward.
    async fn push(&mut self, mut level: usize, mut reference: Address, mut span: u64) -> Result<()> {
        loop {
            if self.levels.len() <= level {
                self.levels.push(Vec::new());
            }
            self.levels[level].push((reference, span));
            if self.levels[level].len() < self.branching() {
                return Ok(());
            }
            (reference, span) = self.flush_level(level).await?;
            level += 1;
        }
    }

    /// Emit an interior chunk from all pending references on `level`.
    async fn flush_level(&mut self, level: usize) -> Result<(Address, u64)> {
        let entries = std::mem::take(&mut self.levels[level]);
        debug_assert!(entries.len() > 1);
        let total: u64 = entries.iter().map(|(_, span)| span).sum();
        let mut body = Vec::with_capacity(entries.len() * self.reference_length());
        for (reference, _) in &entries {
            body.extend_from_slice(reference.as_bytes());
        }
        let reference = self.store_chunk(total, &body).await?;
        Ok((reference, total))
    }

    /// Flush partial levels and return the root reference.
    async fn finish(mut self) -> Result<Address> {
        let mut level = 0;
        loop {
            let is_top = level == self.levels.len() - 1;
            match self.levels[level].len() {
                1 if is_top => {
                    let (reference, _) = self.levels[level].pop().expect("one entry");
                    return Ok(reference);
                }
                0 => {}
                1 => {
                    // A lone leftover bubbles up as-is; wrapping it in an
                    // interior chunk would add a spurious level.
                    let (reference, span) = self.levels[level].pop().expect("one entry");
                    self.carry(level + 1, reference, span);
                }
                _ => {
                    let (reference, span) = self.flush_level(level).await?;
                    self.carry(level + 1, reference, span);
                }
            }
            level += 1;
        }
    }

    fn carry(&mut self, level: usize, reference: Address, span: u64) {
        if self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        self.levels[level].push((reference, span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_store::{MemoryChunkStore, ModeGet};

    async fn split_bytes(store: &MemoryChunkStore, data: &[u8], encrypt: bool) -> Address {
        Splitter::new(store.clone())
            .split(data, data.len() as u64, encrypt, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_input_yields_a_single_leaf() {
        let store = MemoryChunkStore::new();
        let root = split_bytes(&store, &[], false).await;
        assert_eq!(root.len(), HASH_SIZE);
        assert_eq!(store.len(), 1);

        let chunk = store.get(ModeGet::Lookup, &root).await.unwrap();
        assert_eq!(chunk.data().len(), SPAN_SIZE);
        assert_eq!(u64::from_le_bytes(chunk.data()[..8].try_into().unwrap()), 0);
    }

    #[tokio::test]
    async fn exactly_one_chunk_has_no_interior_node() {
        let store = MemoryChunkStore::new();
        let data = vec![0xAA; CHUNK_SIZE];
        let root = split_bytes(&store, &data, false).await;

        // The root reference is the single leaf's own address.
        let mut payload = (CHUNK_SIZE as u64).to_le_bytes().to_vec();
        payload.extend_from_slice(&data);
        assert_eq!(root, drift_store::derive_address(&payload));

        assert_eq!(store.len(), 1);
        let chunk = store.get(ModeGet::Lookup, &root).await.unwrap();
        assert_eq!(&chunk.data()[SPAN_SIZE..], &data[..]);
    }

    #[tokio::test]
    async fn two_leaves_gain_a_root() {
        let store = MemoryChunkStore::new();
        let data = vec![1u8; CHUNK_SIZE + 1];
        let root = split_bytes(&store, &data, false).await;

        // Two leaves plus one interior chunk.
        assert_eq!(store.len(), 3);
        let chunk = store.get(ModeGet::Lookup, &root).await.unwrap();
        let span = u64::from_le_bytes(chunk.data()[..8].try_into().unwrap());
        assert_eq!(span, (CHUNK_SIZE + 1) as u64);
        assert_eq!(chunk.data().len(), SPAN_SIZE + 2 * HASH_SIZE);
    }

    #[tokio::test]
    async fn plaintext_roots_are_reproducible() {
        let a = split_bytes(&MemoryChunkStore::new(), &corpus(123_456), false).await;
        let b = split_bytes(&MemoryChunkStore::new(), &corpus(123_456), false).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn encrypted_roots_are_wide_and_unique() {
        let store = MemoryChunkStore::new();
        let data = corpus(10_000);
        let a = split_bytes(&store, &data, true).await;
        let b = split_bytes(&store, &data, true).await;
        assert_eq!(a.len(), ENCRYPTED_REFERENCE_SIZE);
        // Fresh keys per split, so the same plaintext never repeats a root.
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn short_stream_is_invalid_input() {
        let store = MemoryChunkStore::new();
        let err = Splitter::new(store)
            .split(&b"abc"[..], 10, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn long_stream_is_invalid_input() {
        let store = MemoryChunkStore::new();
        let err = Splitter::new(store)
            .split(&b"abcdef"[..], 3, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    fn corpus(len: usize) -> Vec<u8> {
        // Deterministic pseudo-random bytes, cheap enough for tests.
        let mut state = 0x2545F4914F6CDD1Du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }
}
