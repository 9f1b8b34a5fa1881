//! Download resolver
//!
//! Decides where the bytes of a [`FileRecord`] are served from, trying in
//! order:
//!
//! 1. Local storage, for records without a remote copy
//! 2. The tracked copy on the owning account (refreshed proactively, one
//!    retry on an expired token)
//! 3. A same-named file on any other active account; a candidate whose size
//!    is known and differs from the record is not trusted
//! 4. A redirect to the public URL of the tracked copy
//!
//! The download counter is bumped on every attempt. Nothing remote is
//! written here.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use drivemirror_core::domain::{Account, AccountId, DomainError, FileRecord, FileRecordId, RemoteId};
use drivemirror_core::ports::{IRemoteStorage, IStateRepository, RemoteDownload, RemoteObject};

use crate::credentials::CredentialService;
use crate::SyncError;

/// Where a download is served from
#[derive(Debug)]
pub enum Resolution {
    /// A legacy file under the local storage directory
    Local {
        path: PathBuf,
        file_name: String,
        mime_type: String,
    },
    /// An open stream from one of the accounts
    Stream {
        download: RemoteDownload,
        file_name: String,
        mime_type: String,
        served_by: AccountId,
        /// True when the tracked copy was unavailable and a sibling served it
        fallback: bool,
    },
    /// Every account failed; send the client to the public link
    Redirect { url: String },
}

pub struct DownloadResolver {
    storage: Arc<dyn IRemoteStorage>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
    local_dir: PathBuf,
    list_page_size: u32,
}

impl DownloadResolver {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
        local_dir: PathBuf,
        list_page_size: u32,
    ) -> Self {
        Self {
            storage,
            repository,
            credentials,
            local_dir,
            list_page_size,
        }
    }

    /// Resolves a record by ID
    ///
    /// # Errors
    ///
    /// `FileNotFound` for unknown records, a domain error for an unsafe
    /// local path, or a repository error. Remote failures never surface;
    /// they lead to the next fallback.
    #[instrument(skip(self))]
    pub async fn resolve(&self, record_id: &FileRecordId) -> Result<Resolution, SyncError> {
        let record = self
            .repository
            .get_file_record(record_id)
            .await?
            .ok_or(SyncError::FileNotFound(*record_id))?;

        if let Err(e) = self
            .repository
            .increment_download_count(record_id, Utc::now())
            .await
        {
            warn!(record_id = %record_id, error = %e, "Could not count download");
        }

        let Some((owner_id, remote_id)) = record.remote_location() else {
            return Ok(Resolution::Local {
                path: self.local_path(&record)?,
                file_name: record.original_name.clone(),
                mime_type: record.mime_type.clone(),
            });
        };

        match self.open_tracked(owner_id, remote_id).await {
            Ok(download) => {
                return Ok(Resolution::Stream {
                    download,
                    file_name: record.original_name.clone(),
                    mime_type: record.mime_type.clone(),
                    served_by: *owner_id,
                    fallback: false,
                })
            }
            Err(e) => {
                warn!(
                    record_id = %record_id,
                    account_id = %owner_id,
                    error = %e,
                    "Tracked copy unavailable, searching other accounts"
                );
            }
        }

        if let Some((account_id, download)) = self.open_sibling(&record, owner_id).await? {
            info!(record_id = %record_id, served_by = %account_id, "Served from sibling copy");
            return Ok(Resolution::Stream {
                download,
                file_name: record.original_name.clone(),
                mime_type: record.mime_type.clone(),
                served_by: account_id,
                fallback: true,
            });
        }

        let url = self.storage.public_url(remote_id);
        warn!(record_id = %record_id, "No account could serve the file, redirecting to public URL");
        Ok(Resolution::Redirect { url })
    }

    /// Legacy location under the local storage directory
    fn local_path(&self, record: &FileRecord) -> Result<PathBuf, SyncError> {
        let relative = record
            .local_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&record.original_name));
        if !is_contained(&relative) {
            return Err(DomainError::ValidationFailed(format!(
                "Local path escapes storage directory: {}",
                relative.display()
            ))
            .into());
        }
        Ok(self.local_dir.join(relative))
    }

    async fn open_tracked(
        &self,
        owner_id: &AccountId,
        remote_id: &RemoteId,
    ) -> Result<RemoteDownload, SyncError> {
        let mut account = self
            .repository
            .get_account(owner_id)
            .await?
            .ok_or(SyncError::AccountNotFound(*owner_id))?;

        self.credentials.ensure_fresh(&mut account, false).await?;
        self.download_from(&mut account, remote_id).await
    }

    /// First active account (other than `owner_id`) that holds a matching
    /// file and opens a stream for it
    async fn open_sibling(
        &self,
        record: &FileRecord,
        owner_id: &AccountId,
    ) -> Result<Option<(AccountId, RemoteDownload)>, SyncError> {
        let siblings = self.repository.list_active_accounts().await?;

        for mut account in siblings.into_iter().filter(|a| a.id() != owner_id) {
            if let Err(e) = self.credentials.ensure_fresh(&mut account, false).await {
                debug!(account_id = %account.id(), error = %e, "Sibling credentials unusable");
                continue;
            }

            let storage = &self.storage;
            let page_size = self.list_page_size;
            let objects = match self
                .credentials
                .with_auth_retry(&mut account, |token| async move {
                    storage.list_all(&token, page_size).await
                })
                .await
            {
                Ok(objects) => objects,
                Err(e) => {
                    debug!(account_id = %account.id(), error = %e, "Could not list sibling files");
                    continue;
                }
            };

            for candidate in objects.iter().filter(|o| matches_record(o, record)) {
                match self.download_from(&mut account, &candidate.id).await {
                    Ok(download) => return Ok(Some((*account.id(), download))),
                    Err(e) => debug!(
                        account_id = %account.id(),
                        remote_id = %candidate.id,
                        error = %e,
                        "Sibling candidate failed"
                    ),
                }
            }
        }

        Ok(None)
    }

    async fn download_from(
        &self,
        account: &mut Account,
        remote_id: &RemoteId,
    ) -> Result<RemoteDownload, SyncError> {
        let storage = &self.storage;
        self.credentials
            .with_auth_retry(account, |token| async move {
                storage.download(&token, remote_id).await
            })
            .await
    }
}

/// Exact name match; a known size must equal the record's size
fn matches_record(object: &RemoteObject, record: &FileRecord) -> bool {
    !object.is_folder()
        && object.name == record.original_name
        && object.size.map_or(true, |size| size == record.size_bytes)
}

/// True if `path` is relative and never climbs out of its base
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
