//! HTTP request handlers

pub mod bzz;
pub mod dirs;
pub mod files;

use crate::error::ApiError;
use crate::{ENCRYPT_HEADER, TAG_UID_HEADER};
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use drift_store::{Address, ENCRYPTED_REFERENCE_SIZE, HASH_SIZE};
use futures::TryStreamExt;
use tokio::io::{AsyncSeekExt, SeekFrom};
use tokio_util::io::StreamReader;
use tracing::{debug, error};

/// Whether the request opted into encryption
pub(crate) fn encrypt_requested(headers: &HeaderMap) -> bool {
    headers
        .get(ENCRYPT_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parse the upload tag header when present
pub(crate) fn tag_uid(headers: &HeaderMap) -> Result<Option<u64>, ApiError> {
    match headers.get(TAG_UID_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| ApiError::bad_request("invalid swarm-tag-uid header")),
    }
}

/// The media type of the request body, defaulting to octet-stream
pub(crate) fn media_type(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(mime::APPLICATION_OCTET_STREAM.essence_str().to_string());
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::bad_request("invalid content-type header"))?;
    let parsed: mime::Mime = raw
        .parse()
        .map_err(|_| ApiError::bad_request("invalid content-type header"))?;
    Ok(parsed.essence_str().to_ascii_lowercase())
}

/// Parse a hex reference; width must be plain or encrypted
pub(crate) fn parse_reference(raw: &str, what: &str) -> Result<Address, ApiError> {
    let address = Address::from_hex(raw).map_err(|e| {
        error!("{what}: parse address");
        debug!(raw, error = %e, "{what}: parse address");
        ApiError::bad_request(format!("invalid {what} address"))
    })?;
    if address.len() != HASH_SIZE && address.len() != ENCRYPTED_REFERENCE_SIZE {
        error!("{what}: invalid reference length");
        debug!(raw, length = address.len(), "{what}: invalid reference length");
        return Err(ApiError::bad_request(format!("invalid {what} address")));
    }
    Ok(address)
}

/// Spool a request body into an unnamed temporary file.
///
/// Used when the content length is not declared up front; the splitter
/// needs the exact byte count before the first chunk.
pub(crate) async fn spool_body(body: Body) -> Result<(tokio::fs::File, u64), ApiError> {
    let file = tempfile::tempfile().map_err(|e| {
        error!("spool body: create temporary file");
        debug!(error = %e, "spool body: create temporary file");
        ApiError::internal("cannot buffer request body")
    })?;
    let mut file = tokio::fs::File::from_std(file);

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    let size = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
        error!("spool body: write temporary file");
        debug!(error = %e, "spool body: write temporary file");
        ApiError::internal("cannot buffer request body")
    })?;
    file.seek(SeekFrom::Start(0)).await.map_err(|e| {
        error!("spool body: rewind temporary file");
        debug!(error = %e, "spool body: rewind temporary file");
        ApiError::internal("cannot buffer request body")
    })?;
    Ok((file, size))
}
