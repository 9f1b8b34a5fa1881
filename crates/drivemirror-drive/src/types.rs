//! Google Drive API response types
//!
//! Data structures for serializing requests to and deserializing responses
//! from the Drive v3 API.

use chrono::{DateTime, Utc};
use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{RemoteObject, UploadedObject};
use serde::{Deserialize, Serialize};

use crate::DriveError;

/// Fields requested for every file resource
pub const FILE_FIELDS: &str = "id,name,mimeType,size,md5Checksum,parents,createdTime,modifiedTime";

/// Drive API files resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    /// Size in bytes, sent by Drive as a decimal string (absent for folders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,

    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

impl DriveFile {
    fn remote_id(&self) -> Result<RemoteId, DriveError> {
        RemoteId::new(self.id.clone())
            .map_err(|e| DriveError::InvalidResponse(format!("bad file id: {e}")))
    }

    fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    /// Converts into the port-level DTO
    pub fn into_remote_object(self) -> Result<RemoteObject, DriveError> {
        let id = self.remote_id()?;
        let size = self.size_bytes();
        // Parents Drive reports are always valid IDs; anything else is dropped
        let parents = self
            .parents
            .iter()
            .filter_map(|p| RemoteId::new(p.clone()).ok())
            .collect();

        Ok(RemoteObject {
            id,
            size,
            parents,
            created_time: parse_time(self.created_time.as_deref()),
            modified_time: parse_time(self.modified_time.as_deref()),
            name: self.name,
            md5_checksum: self.md5_checksum,
            mime_type: self.mime_type,
        })
    }

    /// Converts into an upload result
    pub fn into_uploaded(self) -> Result<UploadedObject, DriveError> {
        Ok(UploadedObject {
            id: self.remote_id()?,
            size: self.size_bytes(),
            name: self.name,
        })
    }
}

/// Drive API files.list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata body for creating a file or folder
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

/// Body for permissions.create
#[derive(Debug, Serialize)]
pub struct PermissionRequest<'a> {
    pub role: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
