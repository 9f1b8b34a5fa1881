//! DriveMirror Drive - Google Drive v3 adapter
//!
//! Provides async clients for:
//! - Google OAuth2 (authorization code, refresh, tokeninfo, revoke, userinfo)
//! - Drive file operations (resumable upload, streaming download, folders,
//!   permissions, moves)
//!
//! ## Modules
//!
//! - [`auth`] - `ITokenProvider` implementation backed by the `oauth2` crate
//! - [`client`] - Drive HTTP client with status classification and retries
//! - [`files`] - Individual Drive v3 file operations
//! - [`provider`] - `IRemoteStorage` implementation delegating to [`files`]
//! - [`types`] - Drive v3 wire types

pub mod auth;
pub mod client;
pub mod files;
pub mod provider;
pub mod types;

use std::time::Duration;

use drivemirror_core::ports::RemoteError;
use thiserror::Error;

pub use auth::GoogleTokenProvider;
pub use client::DriveClient;
pub use provider::GoogleDriveStorage;

/// Errors that can occur when communicating with the Google Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// The access token is invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions or quota exceeded
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other unexpected status
    #[error("Unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Reading a local file for upload failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DriveError> for RemoteError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Unauthorized(_) => RemoteError::AuthExpired,
            DriveError::NotFound(what) => RemoteError::NotFound(what),
            other => RemoteError::OperationFailed(other.to_string()),
        }
    }
}
