//! Manifest path resolution handler
//!
//! `/bzz/{reference}/{path}` walks from a directory upload's root entry to
//! the manifest trie, resolves the path to a file entry, and streams the
//! file with the metadata it was uploaded with.

use crate::error::ApiError;
use crate::handlers::files::serve_content;
use crate::handlers::parse_reference;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::Response;
use drift_core::{CoreError, Entry, Joiner, Manifest, Metadata, MANIFEST_CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, error};

/// GET /bzz/{reference}/{path} - resolve a path within a manifest
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((reference, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let address = parse_reference(&reference, "bzz")?;
    let joiner = Joiner::new(Arc::clone(&state.store));

    // Root entry wraps the manifest.
    let entry_bytes = joiner.read_all(&address).await.map_err(|e| {
        error!("bzz download: read entry");
        debug!(address = %address, error = %e, "bzz download: read entry");
        ApiError::not_found("not found")
    })?;
    let root_entry = Entry::from_bytes(&entry_bytes).map_err(|e| {
        error!("bzz download: decode entry");
        debug!(address = %address, error = %e, "bzz download: decode entry");
        ApiError::internal("error decoding entry")
    })?;

    let metadata_bytes = joiner.read_all(root_entry.metadata()).await.map_err(|e| {
        error!("bzz download: read metadata");
        debug!(address = %address, error = %e, "bzz download: read metadata");
        ApiError::not_found("not found")
    })?;
    let metadata = Metadata::from_bytes(&metadata_bytes).map_err(|e| {
        error!("bzz download: decode metadata");
        debug!(address = %address, error = %e, "bzz download: decode metadata");
        ApiError::internal("error decoding metadata")
    })?;

    if metadata.mime_type != MANIFEST_CONTENT_TYPE {
        error!("bzz download: not a manifest");
        debug!(address = %address, mime_type = %metadata.mime_type, "bzz download: not a manifest");
        return Err(ApiError::bad_request("not a manifest"));
    }

    let mut manifest = Manifest::from_reference(Arc::clone(&state.store), root_entry.reference());
    let file_entry_reference = manifest.lookup(&path).await.map_err(|e| match e {
        CoreError::NotFound => {
            debug!(address = %address, path = %path, "bzz download: path not found");
            ApiError::not_found("path address not found")
        }
        other => {
            error!("bzz download: manifest lookup");
            debug!(address = %address, path = %path, error = %other, "bzz download: manifest lookup");
            ApiError::internal("error loading manifest")
        }
    })?;

    // Resolve the file entry behind the manifest binding.
    let file_entry_bytes = joiner.read_all(&file_entry_reference).await.map_err(|e| {
        error!("bzz download: read file entry");
        debug!(address = %address, error = %e, "bzz download: read file entry");
        ApiError::not_found("not found")
    })?;
    let file_entry = Entry::from_bytes(&file_entry_bytes).map_err(|e| {
        error!("bzz download: decode file entry");
        debug!(address = %address, error = %e, "bzz download: decode file entry");
        ApiError::internal("error decoding file entry")
    })?;

    let file_metadata_bytes = joiner.read_all(file_entry.metadata()).await.map_err(|e| {
        error!("bzz download: read file metadata");
        debug!(address = %address, error = %e, "bzz download: read file metadata");
        ApiError::not_found("not found")
    })?;
    let file_metadata = Metadata::from_bytes(&file_metadata_bytes).map_err(|e| {
        error!("bzz download: decode file metadata");
        debug!(address = %address, error = %e, "bzz download: decode file metadata");
        ApiError::internal("error decoding file metadata")
    })?;

    let extra = vec![
        (
            CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", file_metadata.filename),
        ),
        (CONTENT_TYPE, file_metadata.mime_type),
    ];
    serve_content(&state, file_entry.reference().clone(), &headers, extra).await
}
