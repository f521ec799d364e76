use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::OperationType;

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Failures talking to the upstream prayer-times API
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Rate limited by upstream (HTTP 429, retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient upstream error: HTTP {status}")]
    TransientUpstream { status: u16 },

    #[error("Permanent upstream error: HTTP {status}")]
    PermanentUpstream { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid upstream payload: {0}")]
    Decode(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<FetchError> },

    #[error("Cancelled")]
    Cancelled,
}

/// Failures of the persistence contract
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// No connection or transaction could be obtained at all
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the failure is the store itself rather than the rows written
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Misuse of the progress hub
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("Operation {0} not found")]
    NotFound(Uuid),

    #[error("Operation {0} already finished")]
    AlreadyFinished(Uuid),

    #[error("Operation {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Operation {id} tracks {found:?} work, not {expected:?}")]
    TypeMismatch {
        id: Uuid,
        expected: OperationType,
        found: OperationType,
    },
}

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] FetchError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::NotFound(_) => AppError::NotFound(err.to_string()),
            ProgressError::AlreadyFinished(_)
            | ProgressError::AlreadyExists(_)
            | ProgressError::TypeMismatch { .. } => AppError::Conflict(err.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_type = match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) => "ValidationError",
            AppError::Conflict(_) => "Conflict",
            AppError::Database(_) => "DatabaseError",
            AppError::Store(_) => "StorageError",
            AppError::Upstream(_) => "UpstreamError",
            AppError::Internal(_) => "InternalError",
        };

        let response = ErrorResponse {
            error: ErrorDetail {
                error_type: error_type.to_string(),
                message: self.to_string(),
            },
        };

        HttpResponse::build(self.status_code()).json(response)
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
