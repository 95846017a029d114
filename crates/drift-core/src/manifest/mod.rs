//! Path manifests
//!
//! A manifest maps byte-string paths to references through a compressed
//! trie whose nodes are themselves stored as chunk trees. Serialization is
//! bottom-up: children are saved before their parents, and the root's
//! reference addresses the whole structure.

mod node;

use crate::error::Result;
use crate::joiner::Joiner;
use crate::splitter::Splitter;
use async_trait::async_trait;
use drift_store::{Address, ChunkStore, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE};
use node::Node;
use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::sync::Arc;

/// Content type marking a file entry as a stored manifest
pub const MANIFEST_CONTENT_TYPE: &str = "application/x-drift-manifest+octet-stream";

/// Persistence collaborator for manifest nodes
#[async_trait]
pub trait LoadSaver: Send + Sync {
    /// Load the serialized node bytes behind `reference`
    async fn load(&self, reference: &[u8]) -> Result<Vec<u8>>;

    /// Store serialized node bytes; returns their reference
    async fn save(&self, data: Vec<u8>) -> Result<Vec<u8>>;

    /// Width of the references this trie stores
    fn reference_length(&self) -> usize;

    /// Obfuscation key for the next node to be serialized
    fn obfuscation_key(&self) -> [u8; 32];
}

/// Chunk-store-backed loadsaver: nodes are split and joined like any file
struct ChunkLoadSaver {
    store: Arc<dyn ChunkStore>,
    encrypt: bool,
    // Seeded source for reproducible obfuscation keys in tests.
    rng: Option<Mutex<StdRng>>,
}

#[async_trait]
impl LoadSaver for ChunkLoadSaver {
    async fn load(&self, reference: &[u8]) -> Result<Vec<u8>> {
        let bytes = Joiner::new(Arc::clone(&self.store))
            .read_all(&Address::new(reference.to_vec()))
            .await?;
        Ok(bytes.to_vec())
    }

    async fn save(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let length = data.len() as u64;
        let reference = Splitter::new(Arc::clone(&self.store))
            .split(&data[..], length, self.encrypt, None)
            .await?;
        Ok(reference.as_bytes().to_vec())
    }

    fn reference_length(&self) -> usize {
        if self.encrypt {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            HASH_SIZE
        }
    }

    fn obfuscation_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        match &self.rng {
            Some(rng) => rng.lock().fill_bytes(&mut key),
            None => OsRng.fill_bytes(&mut key),
        }
        key
    }
}

/// A compressed path trie over chunk storage
pub struct Manifest {
    root: Node,
    ls: ChunkLoadSaver,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new(store: Arc<dyn ChunkStore>, encrypt: bool) -> Self {
        Self {
            root: Node::new(),
            ls: ChunkLoadSaver {
                store,
                encrypt,
                rng: None,
            },
        }
    }

    /// Create an empty manifest with deterministic obfuscation keys
    pub fn with_seed(store: Arc<dyn ChunkStore>, encrypt: bool, seed: u64) -> Self {
        Self {
            root: Node::new(),
            ls: ChunkLoadSaver {
                store,
                encrypt,
                rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
            },
        }
    }

    /// Open a stored manifest; encryption follows the reference width
    pub fn from_reference(store: Arc<dyn ChunkStore>, reference: &Address) -> Self {
        Self {
            root: Node::new_ref(reference.as_bytes().to_vec()),
            ls: ChunkLoadSaver {
                store,
                encrypt: reference.is_encrypted_reference(),
                rng: None,
            },
        }
    }

    /// Insert `reference` at `path`, overwriting an existing binding
    pub async fn add(&mut self, path: &str, reference: &Address) -> Result<()> {
        self.root
            .add(path.as_bytes(), reference.as_bytes(), &self.ls)
            .await
    }

    /// Remove the binding at `path`
    pub async fn remove(&mut self, path: &str) -> Result<()> {
        self.root.remove(path.as_bytes(), &self.ls).await
    }

    /// Resolve `path` to its reference
    pub async fn lookup(&mut self, path: &str) -> Result<Address> {
        let reference = self.root.lookup(path.as_bytes(), &self.ls).await?;
        Ok(Address::new(reference))
    }

    /// Persist the trie and return the root reference
    pub async fn store(&mut self) -> Result<Address> {
        let reference = self.root.save(&self.ls).await?;
        Ok(Address::new(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use drift_store::MemoryChunkStore;

    fn file_reference(tag: u8) -> Address {
        Address::new(vec![tag; HASH_SIZE])
    }

    fn store() -> Arc<dyn ChunkStore> {
        Arc::new(MemoryChunkStore::new())
    }

    #[tokio::test]
    async fn bindings_survive_store_and_reload() {
        let store = store();
        let mut manifest = Manifest::new(Arc::clone(&store), false);
        manifest.add("robots.txt", &file_reference(1)).await.unwrap();
        manifest.add("img/1.png", &file_reference(2)).await.unwrap();
        manifest.add("img/2.png", &file_reference(3)).await.unwrap();
        let root = manifest.store().await.unwrap();

        let mut reloaded = Manifest::from_reference(store, &root);
        assert_eq!(reloaded.lookup("robots.txt").await.unwrap(), file_reference(1));
        assert_eq!(reloaded.lookup("img/1.png").await.unwrap(), file_reference(2));
        assert_eq!(reloaded.lookup("img/2.png").await.unwrap(), file_reference(3));
        assert!(matches!(
            reloaded.lookup("missing").await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn distinct_paths_keep_distinct_references() {
        let mut manifest = Manifest::new(store(), false);
        manifest.add("p", &file_reference(1)).await.unwrap();
        manifest.add("q", &file_reference(2)).await.unwrap();
        assert_eq!(manifest.lookup("p").await.unwrap(), file_reference(1));
        assert_eq!(manifest.lookup("q").await.unwrap(), file_reference(2));
    }

    #[tokio::test]
    async fn seeded_manifests_are_reproducible() {
        let build = |seed| async move {
            let mut manifest = Manifest::with_seed(store(), false, seed);
            manifest.add("a/b/c", &file_reference(1)).await.unwrap();
            manifest.add("a/b/d", &file_reference(2)).await.unwrap();
            manifest.store().await.unwrap()
        };
        assert_eq!(build(42).await, build(42).await);
        assert_ne!(build(42).await, build(43).await);
    }

    #[tokio::test]
    async fn remove_then_lookup_is_not_found() {
        let store = store();
        let mut manifest = Manifest::new(Arc::clone(&store), false);
        manifest.add("a", &file_reference(1)).await.unwrap();
        manifest.add("b", &file_reference(2)).await.unwrap();
        manifest.remove("a").await.unwrap();

        let root = manifest.store().await.unwrap();
        let mut reloaded = Manifest::from_reference(store, &root);
        assert!(matches!(reloaded.lookup("a").await, Err(CoreError::NotFound)));
        assert_eq!(reloaded.lookup("b").await.unwrap(), file_reference(2));
    }

    #[tokio::test]
    async fn encrypted_manifests_use_wide_references() {
        let store = store();
        let mut manifest = Manifest::new(Arc::clone(&store), true);
        let key = drift_crypto::ChunkKey::new([5u8; 32]);
        let entry = file_reference(9).with_key(&key);
        manifest.add("secret", &entry).await.unwrap();
        let root = manifest.store().await.unwrap();
        assert_eq!(root.len(), ENCRYPTED_REFERENCE_SIZE);

        let mut reloaded = Manifest::from_reference(store, &root);
        assert_eq!(reloaded.lookup("secret").await.unwrap(), entry);
    }
}
