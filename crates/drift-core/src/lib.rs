//! # Drift Core
//!
//! The file pipeline of the Drift decentralized storage network.
//!
//! This crate provides:
//! - **Splitter**: fragments a byte stream into a content-addressed chunk
//!   tree, bottom-up, returning the root reference
//! - **Joiner**: a seekable reader over a chunk tree with O(log N)
//!   random access
//! - **Entries**: the binary record binding a file reference to its
//!   metadata reference
//! - **Manifests**: a compressed path trie over chunk storage, mapping
//!   byte-string paths to references
//! - **Tags**: progress tracking across all chunks of one logical upload
//!
//! ## Data flow
//!
//! ```text
//! bytes ──splitter──▶ chunk store ──joiner──▶ bytes
//!                        ▲    │
//!        manifest nodes ─┘    └─ push index (see drift-node)
//! ```

pub mod entry;
pub mod error;
pub mod joiner;
pub mod manifest;
pub mod splitter;
pub mod tags;

pub use entry::{Entry, Metadata};
pub use error::{CoreError, Result};
pub use joiner::{JoinReader, Joiner};
pub use manifest::{LoadSaver, Manifest, MANIFEST_CONTENT_TYPE};
pub use splitter::Splitter;
pub use tags::{Tag, TagRegistry};
