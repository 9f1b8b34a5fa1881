//! Remote storage port (driven/secondary port)
//!
//! This module defines the per-account file operations against a cloud
//! drive. Every method receives the plaintext access token of the account it
//! acts on; the port itself is stateless with respect to accounts.
//!
//! ## Design Notes
//!
//! - Errors are classified into [`RemoteError`] so callers can react to an
//!   expired token (refresh and retry once) or a missing object (fallback)
//!   without inspecting adapter-specific errors.
//! - Downloads are exposed as a byte stream; the HTTP layer forwards it
//!   without buffering the whole file.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::RemoteId;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

// ============================================================================
// Errors
// ============================================================================

/// Classified failure of a remote operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The access token was rejected (HTTP 401)
    #[error("Access token expired or revoked")]
    AuthExpired,

    /// The object does not exist or is not visible to this account (HTTP 404)
    #[error("Remote object not found: {0}")]
    NotFound(String),

    /// Any other failure: network, quota, permission, malformed response
    #[error("Remote operation failed: {0}")]
    OperationFailed(String),
}

impl RemoteError {
    /// Returns true if a credential refresh may fix this error
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, RemoteError::AuthExpired)
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Metadata of a remote file or folder
///
/// Transient port-level DTO; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: RemoteId,
    pub name: String,
    /// Size in bytes (absent for folders and native documents)
    pub size: Option<u64>,
    pub md5_checksum: Option<String>,
    pub mime_type: String,
    /// Parent folder IDs
    pub parents: Vec<RemoteId>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteObject {
    /// Returns true if this object is a folder
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Returns true if `folder` is one of this object's parents
    pub fn has_parent(&self, folder: &RemoteId) -> bool {
        self.parents.iter().any(|p| p == folder)
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub id: RemoteId,
    pub name: String,
    pub size: Option<u64>,
}

/// Content to upload
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// In-memory content
    Bytes(Bytes),
    /// A file on local disk, streamed during upload
    File { path: PathBuf, len: u64 },
}

impl UploadBody {
    /// Length of the content in bytes
    pub fn len(&self) -> u64 {
        match self {
            UploadBody::Bytes(bytes) => bytes.len() as u64,
            UploadBody::File { len, .. } => *len,
        }
    }

    /// Returns true if there is no content
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream of downloaded content
pub type ByteStream = BoxStream<'static, Result<Bytes, RemoteError>>;

/// An opened download
pub struct RemoteDownload {
    /// Content length announced by the provider, if any
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

impl std::fmt::Debug for RemoteDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDownload")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// IRemoteStorage trait
// ============================================================================

/// Port trait for per-account file operations
#[async_trait::async_trait]
pub trait IRemoteStorage: Send + Sync {
    /// Uploads content as a new file, optionally into a parent folder
    async fn upload(
        &self,
        token: &str,
        body: UploadBody,
        name: &str,
        mime_type: &str,
        parent: Option<&RemoteId>,
    ) -> Result<UploadedObject, RemoteError>;

    /// Opens a download stream for a file
    async fn download(&self, token: &str, id: &RemoteId) -> Result<RemoteDownload, RemoteError>;

    /// Deletes a file or folder
    async fn delete(&self, token: &str, id: &RemoteId) -> Result<(), RemoteError>;

    /// Grants "anyone with the link" read access
    async fn make_public(&self, token: &str, id: &RemoteId) -> Result<(), RemoteError>;

    /// Lists non-trashed files visible to the account, up to `page_size` entries
    async fn list_all(&self, token: &str, page_size: u32)
        -> Result<Vec<RemoteObject>, RemoteError>;

    /// Lists non-trashed direct children of a folder
    ///
    /// `None` lists the children of the drive root.
    async fn list_children(
        &self,
        token: &str,
        parent: Option<&RemoteId>,
    ) -> Result<Vec<RemoteObject>, RemoteError>;

    /// Creates a folder, optionally inside a parent
    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&RemoteId>,
    ) -> Result<RemoteId, RemoteError>;

    /// Moves a file into `new_parent`, detaching it from its current parents
    async fn move_to_folder(
        &self,
        token: &str,
        id: &RemoteId,
        new_parent: &RemoteId,
    ) -> Result<(), RemoteError>;

    /// Retrieves metadata for one object
    async fn get_metadata(&self, token: &str, id: &RemoteId)
        -> Result<RemoteObject, RemoteError>;

    /// Public download URL for a file shared with "anyone"
    fn public_url(&self, id: &RemoteId) -> String;
}
