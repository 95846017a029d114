//! Manifest trie nodes
//!
//! A node is a vertex of a compressed byte-trie. Edges carry multi-byte
//! prefixes; the prefixes of a node's forks are disjoint on their first
//! byte, which indexes a 256-bit presence bitmap in the serialized form.
//! Terminal nodes carry an entry reference. Everything after the
//! obfuscation key is XOR-masked on the wire with a keystream derived from
//! that key.
//!
//! Wire layout of a serialized node:
//!
//! ```text
//! obfuscation_key(32) ∥ version_tag(31) ∥ reference_length(1)
//! ∥ entry_len(1) ∥ entry_reference(entry_len)
//! ∥ fork_bitmap(32)
//! ∥ forks, ascending by first byte:
//!     prefix_len(1) ∥ prefix(prefix_len) ∥ child_reference(reference_length)
//! ```

use crate::error::{CoreError, Result};
use crate::manifest::LoadSaver;
use drift_crypto::{keystream, ChunkKey};
use futures::future::BoxFuture;
use std::collections::BTreeMap;

const VERSION_TAG: &[u8; 31] = b"drift-manifest:1.0\0\0\0\0\0\0\0\0\0\0\0\0\0";
const OBFUSCATION_KEY_SIZE: usize = 32;
const BITMAP_SIZE: usize = 32;
// Edge prefixes longer than a length byte can express are chained.
const MAX_PREFIX: usize = 255;

/// An edge of the trie: a compressed prefix and the child it leads to
#[derive(Clone, Debug)]
pub(crate) struct Fork {
    pub prefix: Vec<u8>,
    pub node: Node,
}

/// A trie vertex, possibly an unloaded stub referencing stored bytes
#[derive(Clone, Debug)]
pub(crate) struct Node {
    reference: Option<Vec<u8>>,
    entry: Option<Vec<u8>>,
    forks: BTreeMap<u8, Fork>,
    obfuscation_key: Option<[u8; OBFUSCATION_KEY_SIZE]>,
    loaded: bool,
}

impl Node {
    /// A fresh empty node
    pub fn new() -> Self {
        Self {
            reference: None,
            entry: None,
            forks: BTreeMap::new(),
            obfuscation_key: None,
            loaded: true,
        }
    }

    /// A stub for a stored node, loaded on first access
    pub fn new_ref(reference: Vec<u8>) -> Self {
        Self {
            reference: Some(reference),
            entry: None,
            forks: BTreeMap::new(),
            obfuscation_key: None,
            loaded: false,
        }
    }

    fn with_entry(reference: Vec<u8>) -> Self {
        let mut node = Self::new();
        node.entry = Some(reference);
        node
    }

    /// Build a fork for `path`, chaining nodes when the edge label exceeds
    /// what one length byte can carry.
    fn make_fork(path: &[u8], reference: Vec<u8>) -> Fork {
        if path.len() <= MAX_PREFIX {
            return Fork {
                prefix: path.to_vec(),
                node: Node::with_entry(reference),
            };
        }
        let tail = Self::make_fork(&path[MAX_PREFIX..], reference);
        let mut node = Node::new();
        node.forks.insert(tail.prefix[0], tail);
        Fork {
            prefix: path[..MAX_PREFIX].to_vec(),
            node,
        }
    }

    async fn ensure_loaded(&mut self, ls: &dyn LoadSaver) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let reference = self
            .reference
            .clone()
            .expect("unloaded node carries its reference");
        let bytes = ls.load(&reference).await?;
        let mut node = Self::unmarshal(&bytes)?;
        node.reference = Some(reference);
        *self = node;
        Ok(())
    }

    /// Insert `reference` at `path`, overwriting an existing terminal.
    pub fn add<'a>(
        &'a mut self,
        path: &'a [u8],
        reference: &'a [u8],
        ls: &'a dyn LoadSaver,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_loaded(ls).await?;
            // This node is on the mutation path; its stored form is stale.
            self.reference = None;

            if path.is_empty() {
                self.entry = Some(reference.to_vec());
                return Ok(());
            }

            if !self.forks.contains_key(&path[0]) {
                self.forks
                    .insert(path[0], Self::make_fork(path, reference.to_vec()));
                return Ok(());
            }

            let fork = self.forks.get_mut(&path[0]).expect("fork just checked");
            let common = common_prefix_len(&fork.prefix, path);
            if common == fork.prefix.len() {
                return fork.node.add(&path[common..], reference, ls).await;
            }

            // The edge label and the path diverge: split the edge at the
            // shared prefix and hang both remainders off a new node.
            let mut mid = Node::new();
            let old_suffix = fork.prefix[common..].to_vec();
            let old_node = std::mem::replace(&mut fork.node, Node::new());
            mid.forks.insert(
                old_suffix[0],
                Fork {
                    prefix: old_suffix,
                    node: old_node,
                },
            );
            if path.len() == common {
                mid.entry = Some(reference.to_vec());
            } else {
                mid.forks
                    .insert(path[common], Self::make_fork(&path[common..], reference.to_vec()));
            }
            fork.prefix.truncate(common);
            fork.node = mid;
            Ok(())
        })
    }

    /// Remove the terminal at `path`; merges single-fork chains afterwards.
    pub fn remove<'a>(
        &'a mut self,
        path: &'a [u8],
        ls: &'a dyn LoadSaver,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_loaded(ls).await?;

            if path.is_empty() {
                if self.entry.take().is_none() {
                    return Err(CoreError::NotFound);
                }
                self.reference = None;
                return Ok(());
            }

            let fork = self.forks.get_mut(&path[0]).ok_or(CoreError::NotFound)?;
            if !path.starts_with(&fork.prefix) {
                return Err(CoreError::NotFound);
            }
            fork.node.remove(&path[fork.prefix.len()..], ls).await?;
            self.reference = None;

            let first = path[0];
            let child = &self.forks[&first].node;
            if child.entry.is_none() && child.forks.is_empty() {
                self.forks.remove(&first);
            } else if child.entry.is_none() && child.forks.len() == 1 {
                let fork = self.forks.get_mut(&first).expect("fork present");
                let only = *fork.node.forks.keys().next().expect("one fork");
                let grandchild = fork.node.forks.remove(&only).expect("one fork");
                if fork.prefix.len() + grandchild.prefix.len() <= MAX_PREFIX {
                    fork.prefix.extend_from_slice(&grandchild.prefix);
                    fork.node = grandchild.node;
                } else {
                    // Cannot compress past the prefix length limit.
                    fork.node.forks.insert(only, grandchild);
                }
            }
            Ok(())
        })
    }

    /// Resolve `path` to its entry reference.
    pub fn lookup<'a>(
        &'a mut self,
        path: &'a [u8],
        ls: &'a dyn LoadSaver,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.ensure_loaded(ls).await?;

            if path.is_empty() {
                return self.entry.clone().ok_or(CoreError::NotFound);
            }
            let fork = self.forks.get_mut(&path[0]).ok_or(CoreError::NotFound)?;
            if !path.starts_with(&fork.prefix) {
                return Err(CoreError::NotFound);
            }
            fork.node.lookup(&path[fork.prefix.len()..], ls).await
        })
    }

    /// Persist the subtree bottom-up; returns this node's reference.
    pub fn save<'a>(&'a mut self, ls: &'a dyn LoadSaver) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            if let Some(reference) = &self.reference {
                // Clean or never loaded: already stored.
                return Ok(reference.clone());
            }
            for fork in self.forks.values_mut() {
                fork.node.save(ls).await?;
            }
            let key = *self
                .obfuscation_key
                .get_or_insert_with(|| ls.obfuscation_key());
            let bytes = self.marshal(ls.reference_length(), &key)?;
            let reference = ls.save(bytes).await?;
            self.reference = Some(reference.clone());
            Ok(reference)
        })
    }

    fn marshal(&self, reference_length: usize, key: &[u8; OBFUSCATION_KEY_SIZE]) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(VERSION_TAG);
        bytes.push(reference_length as u8);

        match &self.entry {
            Some(entry) => {
                if entry.len() != reference_length {
                    return Err(CoreError::Manifest(format!(
                        "entry reference is {} bytes in a {}-byte trie",
                        entry.len(),
                        reference_length
                    )));
                }
                bytes.push(reference_length as u8);
                bytes.extend_from_slice(entry);
            }
            None => bytes.push(0),
        }

        let mut bitmap = [0u8; BITMAP_SIZE];
        for &first in self.forks.keys() {
            bitmap[first as usize / 8] |= 1 << (first % 8);
        }
        bytes.extend_from_slice(&bitmap);

        for (&first, fork) in &self.forks {
            debug_assert_eq!(fork.prefix.first(), Some(&first));
            let child = fork.node.reference.as_ref().ok_or_else(|| {
                CoreError::Manifest("child node was not saved before its parent".to_string())
            })?;
            if child.len() != reference_length {
                return Err(CoreError::Manifest(format!(
                    "child reference is {} bytes in a {}-byte trie",
                    child.len(),
                    reference_length
                )));
            }
            bytes.push(fork.prefix.len() as u8);
            bytes.extend_from_slice(&fork.prefix);
            bytes.extend_from_slice(child);
        }

        let mask = keystream(
            &ChunkKey::new(*key),
            0,
            bytes.len() - OBFUSCATION_KEY_SIZE,
        );
        for (b, m) in bytes[OBFUSCATION_KEY_SIZE..].iter_mut().zip(mask) {
            *b ^= m;
        }
        Ok(bytes)
    }

    fn unmarshal(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < OBFUSCATION_KEY_SIZE + VERSION_TAG.len() + 2 + BITMAP_SIZE {
            return Err(CoreError::Manifest(format!(
                "node of {} bytes is shorter than the fixed header",
                bytes.len()
            )));
        }
        let mut key = [0u8; OBFUSCATION_KEY_SIZE];
        key.copy_from_slice(&bytes[..OBFUSCATION_KEY_SIZE]);

        let mut plain = bytes[OBFUSCATION_KEY_SIZE..].to_vec();
        let mask = keystream(&ChunkKey::new(key), 0, plain.len());
        for (b, m) in plain.iter_mut().zip(mask) {
            *b ^= m;
        }

        let mut cursor = 0usize;
        let version = &plain[cursor..cursor + VERSION_TAG.len()];
        if version != VERSION_TAG {
            return Err(CoreError::Manifest("unknown node version tag".to_string()));
        }
        cursor += VERSION_TAG.len();

        let reference_length = plain[cursor] as usize;
        cursor += 1;
        if reference_length != 32 && reference_length != 64 {
            return Err(CoreError::Manifest(format!(
                "reference length {reference_length} is neither plain nor encrypted"
            )));
        }

        let entry_len = plain[cursor] as usize;
        cursor += 1;
        if entry_len != 0 && entry_len != reference_length {
            return Err(CoreError::Manifest(format!(
                "entry length {entry_len} does not match reference length {reference_length}"
            )));
        }
        let entry = if entry_len > 0 {
            let entry = plain
                .get(cursor..cursor + entry_len)
                .ok_or_else(|| CoreError::Manifest("truncated entry reference".to_string()))?
                .to_vec();
            cursor += entry_len;
            Some(entry)
        } else {
            None
        };

        let bitmap = plain
            .get(cursor..cursor + BITMAP_SIZE)
            .ok_or_else(|| CoreError::Manifest("truncated fork bitmap".to_string()))?
            .to_vec();
        cursor += BITMAP_SIZE;

        let mut forks = BTreeMap::new();
        for first in 0..=255u8 {
            if bitmap[first as usize / 8] & (1 << (first % 8)) == 0 {
                continue;
            }
            let prefix_len = *plain
                .get(cursor)
                .ok_or_else(|| CoreError::Manifest("truncated fork".to_string()))?
                as usize;
            cursor += 1;
            if prefix_len == 0 {
                return Err(CoreError::Manifest("empty fork prefix".to_string()));
            }
            let prefix = plain
                .get(cursor..cursor + prefix_len)
                .ok_or_else(|| CoreError::Manifest("truncated fork prefix".to_string()))?
                .to_vec();
            cursor += prefix_len;
            if prefix[0] != first {
                return Err(CoreError::Manifest(
                    "fork prefix contradicts the bitmap".to_string(),
                ));
            }
            let child = plain
                .get(cursor..cursor + reference_length)
                .ok_or_else(|| CoreError::Manifest("truncated child reference".to_string()))?
                .to_vec();
            cursor += reference_length;
            forks.insert(
                first,
                Fork {
                    prefix,
                    node: Node::new_ref(child),
                },
            );
        }
        if cursor != plain.len() {
            return Err(CoreError::Manifest(format!(
                "{} trailing bytes after the last fork",
                plain.len() - cursor
            )));
        }

        Ok(Self {
            reference: None,
            entry,
            forks,
            obfuscation_key: Some(key),
            loaded: true,
        })
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
