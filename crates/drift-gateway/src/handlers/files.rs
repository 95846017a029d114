//! File upload and download handlers
//!
//! An uploaded file becomes three chunk trees: the data itself, its
//! metadata record, and the entry binding the two. The entry's root
//! reference is what clients get back and later present for download.

use crate::error::ApiError;
use crate::handlers::{encrypt_requested, media_type, parse_reference, spool_body, tag_uid};
use crate::state::AppState;
use crate::TAG_UID_HEADER;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
    IF_NONE_MATCH, RANGE,
};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drift_core::{CoreError, Entry, JoinReader, Joiner, Metadata, Splitter, Tag};
use drift_store::{Address, ChunkStore, StoreError};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, error};

const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Returned when an upload succeeds
#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    /// Root reference of the stored entry
    pub reference: Address,
}

#[derive(Deserialize, Default)]
struct UploadParams {
    name: Option<String>,
}

/// A file on its way into the pipeline
pub(crate) struct FileUploadInfo<R> {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub reader: R,
}

/// Run the file pipeline: data, metadata and entry chunk trees.
///
/// Returns the entry reference. An empty name falls back to the file
/// reference hex.
pub(crate) async fn store_file<R>(
    store: Arc<dyn ChunkStore>,
    info: FileUploadInfo<R>,
    encrypt: bool,
    tag: Option<&Tag>,
) -> Result<Address, CoreError>
where
    R: AsyncRead + Unpin + Send,
{
    let splitter = Splitter::new(Arc::clone(&store));

    let file_reference = splitter.split(info.reader, info.size, encrypt, tag).await?;

    let name = if info.name.is_empty() {
        file_reference.to_hex()
    } else {
        info.name
    };
    let metadata_bytes = Metadata::new(name, info.content_type).to_bytes()?;
    let metadata_reference = splitter
        .split(
            &metadata_bytes[..],
            metadata_bytes.len() as u64,
            encrypt,
            tag,
        )
        .await?;

    let entry_bytes = Entry::new(file_reference, metadata_reference)?.to_bytes();
    splitter
        .split(&entry_bytes[..], entry_bytes.len() as u64, encrypt, tag)
        .await
}

/// POST /files - upload a single file, multipart or raw body
pub async fn upload(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();
    let encrypt = encrypt_requested(&headers);
    let media = media_type(&headers)?;
    let (tag, created) = state.tags.get_or_create(tag_uid(&headers)?);

    let reference = if media == MULTIPART_FORM_DATA {
        let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
            error!("file upload: read multipart");
            debug!(error = %e, "file upload: read multipart");
            ApiError::bad_request("invalid multipart/form-data")
        })?;

        // Only the first part is stored; a file upload is one file.
        let field = multipart
            .next_field()
            .await
            .map_err(|e| {
                error!("file upload: read multipart");
                debug!(error = %e, "file upload: read multipart");
                ApiError::bad_request("invalid multipart/form-data")
            })?
            .ok_or_else(|| {
                error!("file upload: empty multipart");
                ApiError::bad_request("invalid multipart/form-data")
            })?;

        let name = field
            .file_name()
            .or(field.name())
            .unwrap_or_default()
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            error!("file upload: read multipart part");
            debug!(error = %e, "file upload: read multipart part");
            ApiError::bad_request("invalid multipart/form-data")
        })?;
        let content_type = content_type.unwrap_or_else(|| {
            mime_guess::from_path(&name)
                .first_raw()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string()
        });

        let info = FileUploadInfo {
            name,
            content_type,
            size: data.len() as u64,
            reader: &data[..],
        };
        store_file(Arc::clone(&state.store), info, encrypt, Some(&tag))
            .await
            .map_err(|e| {
                error!("file upload: file store");
                debug!(error = %e, "file upload: file store");
                ApiError::internal("could not store file data")
            })?
    } else {
        let name = Query::<UploadParams>::try_from_uri(request.uri())
            .map(|Query(params)| params.name.unwrap_or_default())
            .unwrap_or_default();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.parse::<u64>().map_err(|e| {
                    error!("file upload: content length");
                    debug!(error = %e, "file upload: content length");
                    ApiError::bad_request("invalid content length header")
                })
            })
            .transpose()?;

        let store = Arc::clone(&state.store);
        let result = match content_length {
            Some(size) => {
                let stream = request.into_body().into_data_stream().map_err(std::io::Error::other);
                let info = FileUploadInfo {
                    name,
                    content_type: media,
                    size,
                    reader: StreamReader::new(stream),
                };
                store_file(store, info, encrypt, Some(&tag)).await
            }
            None => {
                let (file, size) = spool_body(request.into_body()).await?;
                let info = FileUploadInfo {
                    name,
                    content_type: media,
                    size,
                    reader: file,
                };
                store_file(store, info, encrypt, Some(&tag)).await
            }
        };
        result.map_err(|e| match e {
            CoreError::InvalidInput(detail) => {
                error!("file upload: invalid input");
                debug!(detail = %detail, "file upload: invalid input");
                ApiError::bad_request("invalid content length header")
            }
            other => {
                error!("file upload: file store");
                debug!(error = %other, "file upload: file store");
                ApiError::internal("could not store file data")
            }
        })?
    };

    if created {
        tag.done_split(reference.clone());
    }

    Ok((
        StatusCode::OK,
        [
            (ETAG, format!("\"{}\"", reference.to_hex())),
            (HeaderName::from_static(TAG_UID_HEADER), tag.uid().to_string()),
            (
                HeaderName::from_static("access-control-expose-headers"),
                TAG_UID_HEADER.to_string(),
            ),
        ],
        Json(UploadResponse { reference }),
    )
        .into_response())
}

/// GET /files/{reference} - download a file by its entry reference
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let address = parse_reference(&reference, "file")?;

    // If-None-Match against the entry reference short-circuits the reads.
    if let Some(etag) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if etag.trim_matches('"') == address.to_hex() {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let joiner = Joiner::new(Arc::clone(&state.store));
    let entry_bytes = joiner.read_all(&address).await.map_err(|e| {
        error!("file download: read entry");
        debug!(address = %address, error = %e, "file download: read entry");
        ApiError::not_found("not found")
    })?;
    let entry = Entry::from_bytes(&entry_bytes).map_err(|e| {
        error!("file download: decode entry");
        debug!(address = %address, error = %e, "file download: decode entry");
        ApiError::internal("error decoding entry")
    })?;

    let metadata_bytes = joiner.read_all(entry.metadata()).await.map_err(|e| {
        error!("file download: read metadata");
        debug!(address = %address, error = %e, "file download: read metadata");
        ApiError::not_found("not found")
    })?;
    let metadata = Metadata::from_bytes(&metadata_bytes).map_err(|e| {
        error!("file download: decode metadata");
        debug!(address = %address, error = %e, "file download: decode metadata");
        ApiError::internal("error decoding metadata")
    })?;

    let extra = vec![
        (
            CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", metadata.filename),
        ),
        (CONTENT_TYPE, metadata.mime_type),
    ];
    serve_content(&state, entry.reference().clone(), &headers, extra).await
}

/// Stream a chunk tree as an HTTP body, honouring single-range requests.
pub(crate) async fn serve_content(
    state: &AppState,
    reference: Address,
    request_headers: &HeaderMap,
    extra_headers: Vec<(HeaderName, String)>,
) -> Result<Response, ApiError> {
    let reader = Joiner::new(Arc::clone(&state.store))
        .join(&reference)
        .await
        .map_err(|e| match e {
            CoreError::Store(StoreError::NotFound(_)) | CoreError::IncompleteTree(_) => {
                error!("download: not found");
                debug!(reference = %reference, error = %e, "download: not found");
                ApiError::not_found("not found")
            }
            other => {
                error!("download: invalid root chunk");
                debug!(reference = %reference, error = %other, "download: invalid root chunk");
                ApiError::bad_request("invalid root chunk")
            }
        })?;
    let size = reader.size();

    let range = request_headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|header| parse_range(header, size));

    let mut response = match range {
        None => {
            let body = stream_body(reader, 0, size);
            let mut response = Response::new(body);
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, header_value(size.to_string())?);
            response
        }
        Some(Some((start, end))) => {
            let len = end - start + 1;
            let body = stream_body(reader, start, len);
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, header_value(len.to_string())?);
            response.headers_mut().insert(
                CONTENT_RANGE,
                header_value(format!("bytes {start}-{end}/{size}"))?,
            );
            response
        }
        Some(None) => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(CONTENT_RANGE, format!("bytes */{size}"))],
                Json(serde_json::json!({
                    "message": "invalid range",
                    "code": StatusCode::RANGE_NOT_SATISFIABLE.as_u16(),
                })),
            )
                .into_response());
        }
    };

    let headers = response.headers_mut();
    headers.insert(ETAG, header_value(format!("\"{}\"", reference.to_hex()))?);
    headers.insert(ACCEPT_RANGES, header_value("bytes".to_string())?);
    for (name, value) in extra_headers {
        headers.insert(name, header_value(value)?);
    }
    Ok(response)
}

fn header_value(value: String) -> Result<axum::http::HeaderValue, ApiError> {
    axum::http::HeaderValue::from_str(&value)
        .map_err(|_| ApiError::internal("invalid response header"))
}

/// Drive a [`JoinReader`] as a streaming body, one segment at a time.
fn stream_body(reader: JoinReader, start: u64, len: u64) -> Body {
    const SEGMENT: u64 = 64 * 1024;
    let stream = futures::stream::try_unfold(
        (reader, start, len),
        |(reader, offset, remaining)| async move {
            if remaining == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            let take = remaining.min(SEGMENT) as usize;
            let bytes = reader
                .read_range(offset, take)
                .await
                .map_err(std::io::Error::other)?;
            if bytes.is_empty() {
                return Ok(None);
            }
            let n = bytes.len() as u64;
            Ok(Some((bytes, (reader, offset + n, remaining - n))))
        },
    );
    Body::from_stream(stream)
}

/// Parse a single-range `Range` header against a content size.
///
/// Returns `None` when the header is malformed or unsatisfiable; the
/// inclusive `(start, end)` pair otherwise.
fn parse_range(header: &str, size: u64) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        // Multi-range responses are not produced.
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = match (start.is_empty(), end.is_empty()) {
        // "-n": the final n bytes.
        (true, false) => {
            let n: u64 = end.parse().ok()?;
            if n == 0 || size == 0 {
                return None;
            }
            (size.saturating_sub(n), size - 1)
        }
        // "a-": from a to the end.
        (false, true) => (start.parse().ok()?, size.checked_sub(1)?),
        // "a-b".
        (false, false) => (start.parse().ok()?, end.parse().ok()?),
        (true, true) => return None,
    };
    if start > end || start >= size {
        return None;
    }
    Some((start, end.min(size - 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("bytes=0-499", 1000), Some((0, 499)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=-200", 1000), Some((800, 999)));
        assert_eq!(parse_range("bytes=0-5000", 1000), Some((0, 999)));
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=5-2", 1000), None);
        assert_eq!(parse_range("bytes=0-1,5-9", 1000), None);
        assert_eq!(parse_range("chunks=0-1", 1000), None);
        assert_eq!(parse_range("bytes=-0", 1000), None);
        assert_eq!(parse_range("bytes=0-", 0), None);
    }
}
