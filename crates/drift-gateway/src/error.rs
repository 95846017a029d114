//! API error responses
//!
//! Every error leaves the gateway as `{"message": <string>, "code": <int>}`
//! with the matching HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// An error response carried to the HTTP client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request: bad reference, bad content type, empty archive
    #[error("{0}")]
    BadRequest(String),

    /// A chunk or manifest path is missing
    #[error("{0}")]
    NotFound(String),

    /// Serialization or storage failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// 400 with a message
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 404 with a message
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// 500 with a message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            message: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
