//! API error types and response formatting (§7: error kinds and policies).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// One variant per error kind from spec.md §7. `status_code()` is the
/// one place that kind maps to an HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InputInvalid(String),

    #[error("{0}")]
    NotAuthorized(String),

    #[error("{0}")]
    Exhausted(String),

    #[error("store unavailable: {0}")]
    StoreTransient(String),

    #[error("{0}")]
    StoreConflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            ApiError::Exhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StoreTransient(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Slot-write CAS conflicts surface as 500; a domain-lease
            // conflict is remapped to NotAuthorized by the caller before
            // it ever becomes this variant (validateDomainIsAvailable is
            // advisory, withDomainLease is authoritative).
            ApiError::StoreConflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> i32 {
        self.status_code().as_u16() as i32
    }
}

/// `{error:{msg, code}}`, exactly as spec.md §4.C's error envelope.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    msg: String,
    code: i32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            error: ErrorBody {
                msg: self.to_string(),
                code: self.code(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NotFound(k) => ApiError::Internal(format!("key not found: {k}")),
            crate::store::StoreError::Precondition(k) => {
                ApiError::StoreConflict(format!("precondition failed: {k}"))
            }
            crate::store::StoreError::Transport(msg) => ApiError::StoreTransient(msg),
        }
    }
}

impl From<crate::identity::IdentityError> for ApiError {
    fn from(err: crate::identity::IdentityError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("serialization error: {err}"))
    }
}
