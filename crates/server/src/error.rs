//! API error types.

use crate::gitlab::OAuthClientError;
use crate::identity::IdentityError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bloom_core::CipherError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("store error: {0}")]
    Store(#[from] bloom_store::StoreError),

    #[error("storage error: {0}")]
    Storage(#[from] bloom_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] bloom_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
            Self::Config(_) => "config_error",
            Self::Upstream(_) => "upstream_error",
            Self::Store(_) => "store_error",
            Self::Storage(_) => "storage_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(e) => match e {
                bloom_store::StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                bloom_store::StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
                bloom_store::StoreError::Validation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(e) => match e {
                bloom_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                bloom_storage::StorageError::InvalidSignature(_)
                | bloom_storage::StorageError::Expired(_) => StatusCode::FORBIDDEN,
                bloom_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(msg) => Self::BadRequest(msg),
            IdentityError::MissingServiceKey => {
                Self::Config("backend.service_role_key is not configured".to_string())
            }
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<OAuthClientError> for ApiError {
    fn from(err: OAuthClientError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<CipherError> for ApiError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::MissingKey => {
                Self::Config("oauth.token_encryption_key is not configured".to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
