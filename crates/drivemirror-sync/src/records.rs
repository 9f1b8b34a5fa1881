//! File record administration
//!
//! Deleting a record removes the tracked remote copy on a best-effort basis.
//! Replicas on sibling accounts are not tracked and stay in place.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use drivemirror_core::domain::{AccountId, FileRecord, FileRecordId, RemoteId};
use drivemirror_core::ports::{IRemoteStorage, IStateRepository, RecordFilter, RemoteError};

use crate::credentials::CredentialService;
use crate::SyncError;

pub struct RecordService {
    storage: Arc<dyn IRemoteStorage>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
}

impl RecordService {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
    ) -> Self {
        Self {
            storage,
            repository,
            credentials,
        }
    }

    /// Records in display order (sort position, then newest first)
    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<FileRecord>, SyncError> {
        Ok(self.repository.list_file_records(filter).await?)
    }

    pub async fn get(&self, id: &FileRecordId) -> Result<FileRecord, SyncError> {
        self.repository
            .get_file_record(id)
            .await?
            .ok_or(SyncError::FileNotFound(*id))
    }

    /// Deletes a record and, if possible, its tracked remote copy
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &FileRecordId) -> Result<FileRecord, SyncError> {
        let record = self.get(id).await?;

        if let Some((account_id, remote_id)) = record.remote_location() {
            match self.delete_remote(account_id, remote_id).await {
                Ok(()) => info!(remote_id = %remote_id, "Deleted tracked remote copy"),
                Err(SyncError::Remote(RemoteError::NotFound(_))) => {
                    info!(remote_id = %remote_id, "Tracked remote copy already gone")
                }
                Err(e) => warn!(
                    remote_id = %remote_id,
                    account_id = %account_id,
                    error = %e,
                    "Could not delete tracked remote copy, deleting record anyway"
                ),
            }
        }

        self.repository.delete_file_record(id).await?;
        info!(record_id = %id, "File record deleted");
        Ok(record)
    }

    async fn delete_remote(
        &self,
        account_id: &AccountId,
        remote_id: &RemoteId,
    ) -> Result<(), SyncError> {
        let mut account = self
            .repository
            .get_account(account_id)
            .await?
            .ok_or(SyncError::AccountNotFound(*account_id))?;
        self.credentials.ensure_fresh(&mut account, false).await?;

        let storage = &self.storage;
        self.credentials
            .with_auth_retry(&mut account, |token| async move {
                storage.delete(&token, remote_id).await
            })
            .await
    }
}
