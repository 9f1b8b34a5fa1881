//! Upload service
//!
//! Writes a new file to one account (the default unless another is named),
//! records it, and hands it to the replication engine. The caller gets the
//! record back as soon as the first copy exists; fan-out continues in the
//! background.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use drivemirror_core::domain::{
    Account, AccountId, Category, DomainError, FileRecord, NewFileRecord,
};
use drivemirror_core::ports::{IRemoteStorage, IStateRepository};

use crate::credentials::CredentialService;
use crate::replication::{ReplicaContent, ReplicationEngine, ReplicationJob, ReplicationReport};
use crate::taxonomy::TaxonomyResolver;
use crate::SyncError;

/// A file to upload
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub title: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub category: Category,
    pub original_name: String,
    pub mime_type: String,
    /// Target account; the default account when `None`
    pub account_id: Option<AccountId>,
    pub content: ReplicaContent,
}

#[derive(Debug)]
pub struct UploadResult {
    pub record: FileRecord,
    /// Background replication, present when the file went to the default account
    pub replication: Option<JoinHandle<Option<ReplicationReport>>>,
}

pub struct UploadService {
    storage: Arc<dyn IRemoteStorage>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
    taxonomy: Arc<TaxonomyResolver>,
    replication: ReplicationEngine,
    make_public: bool,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
        taxonomy: Arc<TaxonomyResolver>,
        replication: ReplicationEngine,
        make_public: bool,
    ) -> Self {
        Self {
            storage,
            repository,
            credentials,
            taxonomy,
            replication,
            make_public,
        }
    }

    /// Uploads a file and starts replicating it
    ///
    /// # Errors
    ///
    /// - `NoDefaultAccount` / `AccountNotFound` / `AccountInactive` for the
    ///   target account
    /// - `CredentialRefreshFailed` or a remote error if the upload fails
    #[instrument(skip(self, upload), fields(file = %upload.original_name, category = %upload.category))]
    pub async fn upload(&self, upload: NewUpload) -> Result<UploadResult, SyncError> {
        if upload.title.trim().is_empty() {
            return Err(DomainError::ValidationFailed("title must not be empty".to_string()).into());
        }
        if upload.original_name.trim().is_empty() {
            return Err(
                DomainError::ValidationFailed("file name must not be empty".to_string()).into(),
            );
        }

        let mut account = self.target_account(upload.account_id).await?;
        self.credentials.ensure_fresh(&mut account, false).await?;

        let taxonomy = &self.taxonomy;
        let account_id = *account.id();
        let hierarchy = self
            .credentials
            .with_auth_retry(&mut account, |token| async move {
                taxonomy.ensure_hierarchy(&account_id, &token).await
            })
            .await?;
        let folder = hierarchy
            .folder_for(upload.category)
            .cloned()
            .ok_or_else(|| DomainError::UnknownCategory(upload.category.to_string()))?;

        let storage = &self.storage;
        let folder_ref = &folder;
        let request = &upload;
        let uploaded = self
            .credentials
            .with_auth_retry(&mut account, |token| async move {
                storage
                    .upload(
                        &token,
                        request.content.body(),
                        &request.original_name,
                        &request.mime_type,
                        Some(folder_ref),
                    )
                    .await
            })
            .await?;

        if self.make_public {
            let id = &uploaded.id;
            if let Err(e) = self
                .credentials
                .with_auth_retry(&mut account, |token| async move {
                    storage.make_public(&token, id).await
                })
                .await
            {
                warn!(remote_id = %uploaded.id, error = %e, "Could not share upload publicly");
            }
        }

        let sort_position = self.repository.next_sort_position().await?;
        let record = FileRecord::new(
            NewFileRecord {
                title: upload.title.clone(),
                description: upload.description.clone(),
                version: upload.version.clone(),
                category: upload.category,
                original_name: upload.original_name.clone(),
                size_bytes: uploaded.size.unwrap_or_else(|| upload.content.len()),
                mime_type: upload.mime_type.clone(),
                remote_file_id: Some(uploaded.id.clone()),
                remote_account_id: Some(*account.id()),
                local_path: None,
            },
            sort_position,
        );
        self.repository.save_file_record(&record).await?;

        info!(
            record_id = %record.id,
            account_id = %account.id(),
            remote_id = %uploaded.id,
            "File uploaded"
        );

        let replication = account.is_default().then(|| {
            self.replication.spawn(ReplicationJob {
                record_id: record.id,
                source_account_id: *account.id(),
                file_name: upload.original_name,
                mime_type: upload.mime_type,
                category: upload.category,
                content: upload.content,
            })
        });

        Ok(UploadResult {
            record,
            replication,
        })
    }

    async fn target_account(&self, account_id: Option<AccountId>) -> Result<Account, SyncError> {
        let account = match account_id {
            Some(id) => self
                .repository
                .get_account(&id)
                .await?
                .ok_or(SyncError::AccountNotFound(id))?,
            None => self
                .repository
                .get_default_account()
                .await?
                .ok_or(SyncError::NoDefaultAccount)?,
        };

        if !account.is_active() {
            return Err(SyncError::AccountInactive(*account.id()));
        }
        Ok(account)
    }
}
