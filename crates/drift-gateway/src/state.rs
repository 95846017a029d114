//! Application state

use crate::config::GatewayConfig;
use drift_core::TagRegistry;
use drift_node::{Accounting, AccountingOptions};
use drift_store::{ChunkStore, MemoryChunkStore, MemoryStateStore};
use std::sync::Arc;
use tracing::warn;

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Local chunk store
    pub store: Arc<dyn ChunkStore>,
    /// Upload progress tags
    pub tags: TagRegistry,
    /// Peer balance ledger
    pub accounting: Arc<Accounting>,
}

impl AppState {
    /// Create application state over an in-memory store.
    ///
    /// Persistent backends plug in through [`AppState::with_store`].
    pub fn new(config: GatewayConfig) -> Self {
        warn!("using in-memory chunk store; data will not persist");
        let store: Arc<dyn ChunkStore> = Arc::new(MemoryChunkStore::new());
        Self::with_store(config, store)
    }

    /// Create application state over the given chunk store
    pub fn with_store(config: GatewayConfig, store: Arc<dyn ChunkStore>) -> Self {
        let accounting = Arc::new(Accounting::new(
            AccountingOptions {
                payment_threshold: config.payment_threshold,
                disconnect_threshold: config.disconnect_threshold,
            },
            Arc::new(MemoryStateStore::new()),
        ));
        Self {
            config,
            store,
            tags: TagRegistry::new(),
            accounting,
        }
    }
}
