//! # Drift Node
//!
//! Long-running node services of the Drift decentralized storage network.
//!
//! This crate provides:
//! - **Pusher**: a background worker draining the local push index and
//!   shipping chunks toward the peers closest to their addresses, with
//!   at-most-one-in-flight-per-address semantics
//! - **Accounting**: a per-peer signed balance ledger governing admission
//!   of outgoing and incoming traffic
//! - **Transport contracts**: the push-sync and topology interfaces the
//!   lower peer-to-peer layer implements

pub mod accounting;
pub mod error;
pub mod pusher;
pub mod topology;

pub use accounting::{Accounting, AccountingOptions};
pub use error::{NodeError, Result};
pub use pusher::Pusher;
pub use topology::{IsolatedNode, PushSync, Receipt, Topology};
