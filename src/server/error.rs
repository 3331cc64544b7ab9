//! API error type and its HTTP mapping.
//!
//! Failures surface to the caller immediately as a status plus a short
//! machine-readable code string under `{"detail": ...}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::core::errors::StoreError;
use crate::patch::PatchError;

/// Error surfaced by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A path id did not parse.
    #[error("invalid_id")]
    InvalidId,
    /// Request input was rejected.
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    /// The addressed record does not exist.
    #[error("not_found")]
    NotFound,
    /// Patch application failed.
    #[error("patch_error: {0}")]
    Patch(#[from] PatchError),
    /// The store could not complete the operation.
    #[error("store_error: {0}")]
    Store(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidId | Self::InvalidInput(_) | Self::Patch(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::InvalidInput(reason) => Self::InvalidInput(reason),
            StoreError::Patch(err) => Self::Patch(err),
            other => Self::Store(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
