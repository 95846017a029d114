//! Upload progress tags
//!
//! A tag spans all chunks of one logical upload. The splitter counts
//! chunks as they are split and stored; the push worker counts receipts.
//! Once the entry reference exists the tag is marked split-complete and
//! carries it.

use dashmap::DashMap;
use drift_store::Address;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Progress counters for one upload
pub struct Tag {
    uid: u64,
    split: AtomicU64,
    stored: AtomicU64,
    synced: AtomicU64,
    address: Mutex<Option<Address>>,
}

impl Tag {
    fn new(uid: u64) -> Self {
        Self {
            uid,
            split: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            address: Mutex::new(None),
        }
    }

    /// The tag's unique identifier
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Count one chunk produced by the splitter
    pub fn inc_split(&self) {
        self.split.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one chunk at rest in the local store
    pub fn inc_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one receipt confirming remote custody
    pub fn inc_synced(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }

    /// Chunks split so far
    pub fn split_count(&self) -> u64 {
        self.split.load(Ordering::Relaxed)
    }

    /// Chunks stored so far
    pub fn stored_count(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Chunks synced so far
    pub fn synced_count(&self) -> u64 {
        self.synced.load(Ordering::Relaxed)
    }

    /// Mark splitting complete, carrying the upload's root reference
    pub fn done_split(&self, address: Address) {
        *self.address.lock() = Some(address);
    }

    /// The upload's root reference once splitting completed
    pub fn address(&self) -> Option<Address> {
        self.address.lock().clone()
    }
}

/// Registry of live tags
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: Arc<DashMap<u64, Arc<Tag>>>,
    next_uid: Arc<AtomicU64>,
}

impl TagRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tags: Arc::new(DashMap::new()),
            next_uid: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a fresh tag
    pub fn create(&self) -> Arc<Tag> {
        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
        let tag = Arc::new(Tag::new(uid));
        self.tags.insert(uid, Arc::clone(&tag));
        tag
    }

    /// Look up a tag by uid
    pub fn get(&self, uid: u64) -> Option<Arc<Tag>> {
        self.tags.get(&uid).map(|e| Arc::clone(e.value()))
    }

    /// Return the tag with `uid`, or a fresh one when absent or `None`.
    ///
    /// The boolean reports whether the tag was created by this call.
    pub fn get_or_create(&self, uid: Option<u64>) -> (Arc<Tag>, bool) {
        match uid.and_then(|uid| self.get(uid)) {
            Some(tag) => (tag, false),
            None => (self.create(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let registry = TagRegistry::new();
        let tag = registry.create();
        tag.inc_split();
        tag.inc_split();
        tag.inc_synced();
        assert_eq!(tag.split_count(), 2);
        assert_eq!(tag.synced_count(), 1);
        assert_eq!(tag.stored_count(), 0);
    }

    #[test]
    fn uids_are_unique_and_resolvable() {
        let registry = TagRegistry::new();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a.uid(), b.uid());
        assert_eq!(registry.get(a.uid()).unwrap().uid(), a.uid());
        assert!(registry.get(9999).is_none());
    }

    #[test]
    fn get_or_create_reuses_live_tags() {
        let registry = TagRegistry::new();
        let (tag, created) = registry.get_or_create(None);
        assert!(created);
        let (same, created) = registry.get_or_create(Some(tag.uid()));
        assert!(!created);
        assert_eq!(same.uid(), tag.uid());
    }

    #[test]
    fn done_split_carries_the_reference() {
        let registry = TagRegistry::new();
        let tag = registry.create();
        assert!(tag.address().is_none());
        let address = Address::new(vec![1u8; 32]);
        tag.done_split(address.clone());
        assert_eq!(tag.address(), Some(address));
    }
}
