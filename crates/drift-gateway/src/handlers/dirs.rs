//! Directory upload handler
//!
//! A directory arrives as a tape archive. Every regular file runs through
//! the file pipeline and lands in a fresh manifest under its archive path;
//! the stored manifest is wrapped in an entry whose metadata marks it as a
//! manifest, and that entry's reference is the upload's root.

use crate::error::ApiError;
use crate::handlers::files::{store_file, FileUploadInfo, UploadResponse};
use crate::handlers::{encrypt_requested, media_type, spool_body, tag_uid};
use crate::state::AppState;
use crate::TAG_UID_HEADER;
use axum::extract::{Request, State};
use axum::http::header::ETAG;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drift_core::{Entry, Manifest, Metadata, Splitter, MANIFEST_CONTENT_TYPE};
use std::io::Read;
use std::path::Path as FilePath;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

const CONTENT_TYPE_TAR: &str = "application/x-tar";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

struct ArchiveFile {
    path: String,
    name: String,
    content_type: String,
    data: Vec<u8>,
}

/// POST /dirs - upload a tape archive as a manifest-addressed directory
pub async fn upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();
    if media_type(&headers)? != CONTENT_TYPE_TAR {
        error!("dir upload: content type not tar");
        return Err(ApiError::bad_request("content-type not set to tar"));
    }
    let encrypt = encrypt_requested(&headers);
    let (tag, created) = state.tags.get_or_create(tag_uid(&headers)?);

    // The tar reader is synchronous; spool the body and parse off the
    // async runtime.
    let (file, _size) = spool_body(request.into_body()).await?;
    let file = file.into_std().await;
    let files = tokio::task::spawn_blocking(move || read_archive(file))
        .await
        .map_err(|e| {
            error!("dir upload: archive task failed");
            debug!(error = %e, "dir upload: archive task failed");
            ApiError::internal("could not store dir")
        })?
        .map_err(|e| {
            error!("dir upload: read tar stream");
            debug!(error = %e, "dir upload: read tar stream");
            ApiError::bad_request("invalid tar stream")
        })?;

    if files.is_empty() {
        error!("dir upload: no files in tar");
        return Err(ApiError::bad_request("empty tar archive"));
    }

    let mut manifest = Manifest::new(Arc::clone(&state.store), encrypt);
    for file in files {
        let size = file.data.len() as u64;
        let info = FileUploadInfo {
            name: file.name,
            content_type: file.content_type,
            size,
            reader: &file.data[..],
        };
        let entry_reference = store_file(Arc::clone(&state.store), info, encrypt, Some(&tag))
            .await
            .map_err(|e| {
                error!("dir upload: store dir file");
                debug!(path = %file.path, error = %e, "dir upload: store dir file");
                ApiError::internal("could not store dir")
            })?;
        trace!(path = %file.path, reference = %entry_reference, "uploaded dir file");

        manifest.add(&file.path, &entry_reference).await.map_err(|e| {
            error!("dir upload: add to manifest");
            debug!(path = %file.path, error = %e, "dir upload: add to manifest");
            ApiError::internal("could not store dir")
        })?;
    }

    let manifest_reference = manifest.store().await.map_err(|e| {
        error!("dir upload: store manifest");
        debug!(error = %e, "dir upload: store manifest");
        ApiError::internal("could not store dir")
    })?;

    // Wrap the manifest in an entry so readers can tell what they hold.
    let splitter = Splitter::new(Arc::clone(&state.store));
    let reference = async {
        let metadata_bytes =
            Metadata::new(manifest_reference.to_hex(), MANIFEST_CONTENT_TYPE).to_bytes()?;
        let metadata_reference = splitter
            .split(
                &metadata_bytes[..],
                metadata_bytes.len() as u64,
                encrypt,
                Some(&tag),
            )
            .await?;
        let entry_bytes = Entry::new(manifest_reference, metadata_reference)?.to_bytes();
        splitter
            .split(&entry_bytes[..], entry_bytes.len() as u64, encrypt, Some(&tag))
            .await
    }
    .await
    .map_err(|e| {
        error!("dir upload: store manifest entry");
        debug!(error = %e, "dir upload: store manifest entry");
        ApiError::internal("could not store dir")
    })?;

    if created {
        tag.done_split(reference.clone());
    }

    Ok((
        StatusCode::OK,
        [
            (ETAG, format!("\"{}\"", reference.to_hex())),
            (HeaderName::from_static(TAG_UID_HEADER), tag.uid().to_string()),
        ],
        Json(UploadResponse { reference }),
    )
        .into_response())
}

/// Read every regular file out of the archive, in order.
fn read_archive(file: std::fs::File) -> std::io::Result<Vec<ArchiveFile>> {
    let mut archive = tar::Archive::new(file);
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();

        if !entry.header().entry_type().is_file() {
            warn!(path = %path, "skipping file upload as it is not a regular file");
            continue;
        }

        let name = FilePath::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        files.push(ArchiveFile {
            path,
            name,
            content_type,
            data,
        });
    }
    Ok(files)
}
