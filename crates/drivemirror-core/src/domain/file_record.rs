//! FileRecord domain entity
//!
//! A FileRecord is the logical file offered for download. It tracks exactly
//! one remote copy (on the account it was first uploaded to); replicas on
//! other accounts are not tracked and are rediscovered by name.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    category::Category,
    newtypes::{AccountId, FileRecordId, RemoteId},
};

/// A downloadable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileRecordId,
    pub title: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub category: Category,
    /// Name of the uploaded file, also its name on Drive
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub download_count: u64,
    /// Display order; ties are broken by creation time, newest first
    pub sort_position: i64,
    /// The tracked remote copy, if the file lives on Drive
    pub remote_file_id: Option<RemoteId>,
    /// The account owning `remote_file_id`
    pub remote_account_id: Option<AccountId>,
    /// Legacy on-disk location, relative to the local storage directory
    pub local_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Builds a record from creation input
    pub fn new(input: NewFileRecord, sort_position: i64) -> Self {
        let now = Utc::now();
        Self {
            id: FileRecordId::new(),
            title: input.title,
            description: input.description,
            version: input.version,
            category: input.category,
            original_name: input.original_name,
            size_bytes: input.size_bytes,
            mime_type: input.mime_type,
            download_count: 0,
            sort_position,
            remote_file_id: input.remote_file_id,
            remote_account_id: input.remote_account_id,
            local_path: input.local_path,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the tracked remote copy as `(account, file)` if both are set
    pub fn remote_location(&self) -> Option<(&AccountId, &RemoteId)> {
        match (&self.remote_account_id, &self.remote_file_id) {
            (Some(account), Some(file)) => Some((account, file)),
            _ => None,
        }
    }

    /// Returns true if the record is stored on Drive
    pub fn is_remote(&self) -> bool {
        self.remote_file_id.is_some()
    }
}

/// Input for creating a FileRecord
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub title: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub category: Category,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub remote_file_id: Option<RemoteId>,
    pub remote_account_id: Option<AccountId>,
    pub local_path: Option<PathBuf>,
}
