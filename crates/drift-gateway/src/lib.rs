//! # Drift Gateway
//!
//! HTTP gateway for the Drift decentralized storage network.
//!
//! This crate provides:
//! - **File endpoints**: upload and download of single files
//! - **Directory endpoints**: tape-archive ingestion into path manifests
//! - **Manifest resolution**: path lookup and streaming under `/bzz`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                HTTP Clients                 │
//! └──────────────────────┬──────────────────────┘
//! ┌──────────────────────▼──────────────────────┐
//! │               Drift Gateway                 │
//! │   /files   /dirs   /bzz/{ref}/{path}        │
//! ├─────────────────────────────────────────────┤
//! │    drift-core (splitter, joiner, manifest)  │
//! ├─────────────────────────────────────────────┤
//! │       drift-store   +   drift-node          │
//! │  (chunk store, pusher, accounting ledger)   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;

/// Header selecting encrypted uploads
pub const ENCRYPT_HEADER: &str = "swarm-encrypt";

/// Header carrying the upload tag identifier
pub const TAG_UID_HEADER: &str = "swarm-tag-uid";
