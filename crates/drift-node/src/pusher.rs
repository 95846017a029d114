//! Background chunk pusher
//!
//! One long-running worker per node drains the local push index and ships
//! every chunk toward the peer closest to its address. Receipts flip the
//! chunk to synced and credit the owning upload tag. The worker never
//! propagates errors; it logs and lets the next subscription pass retry.
//!
//! Concurrency: a semaphore bounds dispatches at [`MAX_IN_FLIGHT`], and a
//! mutex-guarded address set guarantees at most one in-flight push per
//! address even when the subscription re-delivers.

use crate::error::NodeError;
use crate::topology::PushSync;
use drift_core::TagRegistry;
use drift_store::{Address, Chunk, ChunkStore, ModeSet, PushSubscription};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Upper bound on concurrent pushes
pub const MAX_IN_FLIGHT: usize = 10;

/// Idle time before the push index is re-read from the start
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Wait for in-flight pushes on shutdown
pub const GRACE: Duration = Duration::from_secs(2);

/// Pause after a subscription pass that yielded nothing
pub const EMPTY_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// The background push worker
pub struct Pusher {
    store: Arc<dyn ChunkStore>,
    push_sync: Arc<dyn PushSync>,
    tags: TagRegistry,
    retry_interval: Duration,
    empty_batch_pause: Duration,
    grace: Duration,
}

impl Pusher {
    /// Create a pusher over the given store and transport
    pub fn new(
        store: Arc<dyn ChunkStore>,
        push_sync: Arc<dyn PushSync>,
        tags: TagRegistry,
    ) -> Self {
        Self {
            store,
            push_sync,
            tags,
            retry_interval: RETRY_INTERVAL,
            empty_batch_pause: EMPTY_BATCH_PAUSE,
            grace: GRACE,
        }
    }

    /// Override the retry cadence; tests use short intervals
    pub fn with_timing(mut self, retry_interval: Duration, empty_batch_pause: Duration) -> Self {
        self.retry_interval = retry_interval;
        self.empty_batch_pause = empty_batch_pause;
        self
    }

    /// Start the worker; it runs until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        let inflight: Arc<Mutex<HashSet<Address>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut chunks: Option<mpsc::Receiver<Chunk>> = None;
        let mut subscription: Option<PushSubscription> = None;
        let mut chunks_in_batch = 0usize;

        // Fires immediately so the first iteration opens the subscription.
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                maybe_chunk = async { chunks.as_mut().expect("guarded by if").recv().await }, if chunks.is_some() => {
                    match maybe_chunk {
                        Some(chunk) => {
                            chunks_in_batch += 1;
                            // Postpone the sweep while the index still yields.
                            timer.as_mut().reset(Instant::now() + self.retry_interval);

                            let permit = tokio::select! {
                                permit = Arc::clone(&semaphore).acquire_owned() => {
                                    permit.expect("semaphore is never closed")
                                }
                                () = shutdown.cancelled() => break,
                            };
                            self.dispatch(chunk, permit, &inflight);
                        }
                        None => {
                            // End of batch: the subscription was torn down.
                            chunks = None;
                            subscription = None;
                            let pause = if chunks_in_batch == 0 {
                                self.empty_batch_pause
                            } else {
                                self.retry_interval
                            };
                            timer.as_mut().reset(Instant::now() + pause);
                        }
                    }
                }
                () = &mut timer => {
                    if let Some(active) = subscription.take() {
                        active.unsubscribe();
                    }
                    let (rx, guard) = self.store.subscribe_push();
                    chunks = Some(rx);
                    subscription = Some(guard);
                    chunks_in_batch = 0;
                    timer.as_mut().reset(Instant::now() + self.retry_interval);
                    trace!("push index subscription reopened");
                }
                () = shutdown.cancelled() => break,
            }
        }

        drop(subscription);
        drop(chunks);

        // Wait for pending push operations to settle, bounded by grace.
        let drained = tokio::time::timeout(self.grace, semaphore.acquire_many(MAX_IN_FLIGHT as u32));
        if drained.await.is_err() {
            warn!("pusher shutting down with pending operations");
        }
    }

    /// Spawn one push; the permit rides along and frees a dispatch slot on
    /// completion.
    fn dispatch(
        &self,
        chunk: Chunk,
        permit: OwnedSemaphorePermit,
        inflight: &Arc<Mutex<HashSet<Address>>>,
    ) {
        let address = chunk.address().clone();
        if !inflight.lock().insert(address.clone()) {
            // Re-delivered while a push is still in flight; drop it.
            drop(permit);
            return;
        }

        let store = Arc::clone(&self.store);
        let push_sync = Arc::clone(&self.push_sync);
        let tags = self.tags.clone();
        let inflight = Arc::clone(inflight);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = store.set(ModeSet::Push, &address).await {
                debug!(address = %address, error = %e, "failed to mark chunk as pushed");
            }

            match push_sync.push_chunk_to_closest(chunk.clone()).await {
                Ok(_receipt) => {
                    if let Err(e) = store.set(ModeSet::SyncPush, &address).await {
                        error!(address = %address, error = %e, "failed to mark chunk as synced");
                    }
                    if let Some(uid) = chunk.tag_uid() {
                        if let Some(tag) = tags.get(uid) {
                            tag.inc_synced();
                        }
                    }
                    trace!(address = %address, "pushed chunk");
                }
                // An isolated node is the expected quiet case.
                Err(NodeError::NoClosestPeer(_)) => {}
                Err(e) => {
                    debug!(address = %address, error = %e, "error while sending chunk or receiving receipt");
                }
            }

            inflight.lock().remove(&address);
        });
    }
}
