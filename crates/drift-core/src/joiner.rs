//! Chunk tree joiner
//!
//! Reassembles the byte stream addressed by a root reference. Traversal is
//! lazy and demand-driven: `read_range(offset, n)` visits only the chunks
//! covering `[offset, offset + n)`, so random access costs O(log N) chunk
//! fetches. A 64-byte root reference switches the whole traversal to the
//! decrypting store adapter; interior payloads then carry 64-byte child
//! references that decrypt transparently on fetch.

use crate::error::{CoreError, Result};
use bytes::Bytes;
use drift_crypto::{CHUNK_SIZE, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE, SPAN_SIZE};
use drift_store::{Address, ChunkStore, DecryptingStore, ModeGet, StoreError};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Opens seekable readers over chunk trees
#[derive(Clone)]
pub struct Joiner {
    store: DecryptingStore<Arc<dyn ChunkStore>>,
}

impl Joiner {
    /// Create a joiner over the given store
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store: DecryptingStore::new(store),
        }
    }

    /// Fetch the root chunk of `reference` and expose the subtree as a
    /// seekable byte source.
    pub async fn join(&self, reference: &Address) -> Result<JoinReader> {
        let reference_length = match reference.len() {
            HASH_SIZE => HASH_SIZE,
            ENCRYPTED_REFERENCE_SIZE => ENCRYPTED_REFERENCE_SIZE,
            len => return Err(CoreError::Store(StoreError::InvalidReferenceLength(len))),
        };

        let root = self.store.get(ModeGet::Request, reference).await?;
        let payload = root.data().clone();
        if payload.len() < SPAN_SIZE {
            return Err(CoreError::CorruptChunk(format!(
                "root chunk {} is shorter than the span header",
                reference
            )));
        }
        let size = u64::from_le_bytes(payload[..SPAN_SIZE].try_into().expect("span is 8 bytes"));

        Ok(JoinReader {
            store: self.store.clone(),
            root_payload: payload,
            size,
            reference_length,
        })
    }

    /// Convenience: join and read the full content in one call
    pub async fn read_all(&self, reference: &Address) -> Result<Bytes> {
        self.join(reference).await?.read_all().await
    }
}

/// A seekable reader over one chunk tree
pub struct JoinReader {
    store: DecryptingStore<Arc<dyn ChunkStore>>,
    root_payload: Bytes,
    size: u64,
    reference_length: usize,
}

impl JoinReader {
    /// Total byte count of the tree's content
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Short reads happen only at end of content; the result equals the
    /// same slice of a sequential full read.
    pub async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes> {
        if offset >= self.size {
            return Ok(Bytes::new());
        }
        let len = len.min((self.size - offset) as usize);
        let mut out = vec![0u8; len];
        self.read_subtree(self.root_payload.clone(), self.size, offset, &mut out)
            .await?;
        Ok(out.into())
    }

    /// Read the full content
    pub async fn read_all(&self) -> Result<Bytes> {
        if self.size > usize::MAX as u64 {
            return Err(CoreError::InvalidInput(format!(
                "content of {} bytes cannot be buffered",
                self.size
            )));
        }
        self.read_range(0, self.size as usize).await
    }

    /// Largest byte count a single child of a chunk spanning `span` covers.
    ///
    /// Garbage spans (e.g. an encrypted payload read without its key) can
    /// be astronomically large; saturating here turns them into a child
    /// count mismatch instead of an overflow.
    fn child_capacity(&self, span: u64) -> u64 {
        let branching = (CHUNK_SIZE / self.reference_length) as u64;
        let mut capacity = CHUNK_SIZE as u64;
        loop {
            match capacity.checked_mul(branching) {
                Some(next) if next < span => capacity = next,
                _ => return capacity,
            }
        }
    }

    fn read_subtree<'a>(
        &'a self,
        payload: Bytes,
        span: u64,
        offset: u64,
        out: &'a mut [u8],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = &payload[SPAN_SIZE..];

            if span <= CHUNK_SIZE as u64 {
                // Leaf: the body is the data itself.
                if body.len() as u64 != span {
                    return Err(CoreError::CorruptChunk(format!(
                        "leaf carries {} bytes but its span declares {}",
                        body.len(),
                        span
                    )));
                }
                let start = offset as usize;
                out.copy_from_slice(&body[start..start + out.len()]);
                return Ok(());
            }

            // Interior: the body is a packed reference array.
            let capacity = self.child_capacity(span);
            let children = span.div_ceil(capacity) as usize;
            if body.len() != children * self.reference_length {
                return Err(CoreError::CorruptChunk(format!(
                    "interior chunk carries {} bytes but its span {} implies {} references",
                    body.len(),
                    span,
                    children
                )));
            }

            let mut child = (offset / capacity) as usize;
            let mut child_offset = offset - child as u64 * capacity;
            let mut written = 0usize;
            while written < out.len() {
                let child_span = capacity.min(span - child as u64 * capacity);
                let take = ((child_span - child_offset) as usize).min(out.len() - written);
                let reference = Address::new(
                    payload.slice(
                        SPAN_SIZE + child * self.reference_length
                            ..SPAN_SIZE + (child + 1) * self.reference_length,
                    ),
                );

                let chunk = self
                    .store
                    .get(ModeGet::Lookup, &reference)
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound(address) => CoreError::IncompleteTree(address),
                        other => CoreError::Store(other),
                    })?;
                let child_payload = chunk.data().clone();
                if child_payload.len() < SPAN_SIZE {
                    return Err(CoreError::CorruptChunk(format!(
                        "chunk {} is shorter than the span header",
                        reference
                    )));
                }
                let declared = u64::from_le_bytes(
                    child_payload[..SPAN_SIZE].try_into().expect("span is 8 bytes"),
                );
                if declared != child_span {
                    return Err(CoreError::CorruptChunk(format!(
                        "chunk {} spans {} bytes but its parent expects {}",
                        reference, declared, child_span
                    )));
                }

                self.read_subtree(
                    child_payload,
                    child_span,
                    child_offset,
                    &mut out[written..written + take],
                )
                .await?;

                written += take;
                child_offset = 0;
                child += 1;
            }
            Ok(())
        })
    }
}
