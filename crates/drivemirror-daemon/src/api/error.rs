//! HTTP error mapping
//!
//! Every failure is answered with `{"error": {"type": ..., "message": ...}}`
//! and a status code derived from the engine error.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use drivemirror_core::domain::DomainError;
use drivemirror_core::ports::{RemoteError, TokenError};
use drivemirror_sync::SyncError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request that never reached the engine
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ApiError {
    /// Stable machine-readable error type
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Sync(e) => match e {
                SyncError::CredentialRefreshFailed { .. } => "credential_refresh_failed",
                SyncError::NoDefaultAccount => "no_default_account",
                SyncError::NoSyncTargets => "no_sync_targets",
                SyncError::AccountNotFound(_) => "account_not_found",
                SyncError::FileNotFound(_) => "file_not_found",
                SyncError::DefaultAccountLocked(_) => "default_account_locked",
                SyncError::AccountInactive(_) => "account_inactive",
                SyncError::AccountInUse(_) => "account_in_use",
                SyncError::Remote(RemoteError::NotFound(_)) => "remote_not_found",
                SyncError::Remote(_) => "remote_error",
                SyncError::Token(TokenError::Rejected(_)) => "authorization_rejected",
                SyncError::Token(_) => "token_error",
                SyncError::Repository(_) => "storage_error",
                SyncError::Io(_) => "io_error",
                SyncError::Domain(_) => "validation_error",
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sync(e) => match e {
                SyncError::AccountNotFound(_) | SyncError::FileNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                SyncError::NoDefaultAccount
                | SyncError::NoSyncTargets
                | SyncError::DefaultAccountLocked(_)
                | SyncError::AccountInactive(_)
                | SyncError::AccountInUse(_) => StatusCode::CONFLICT,
                SyncError::Domain(_) | SyncError::Token(TokenError::Rejected(_)) => {
                    StatusCode::BAD_REQUEST
                }
                SyncError::CredentialRefreshFailed { .. }
                | SyncError::Remote(_)
                | SyncError::Token(_) => StatusCode::BAD_GATEWAY,
                SyncError::Repository(_) | SyncError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Sync(SyncError::Domain(e))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Sync(SyncError::Io(e))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, kind = self.kind(), "Request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
