//! Synchronization reconciler
//!
//! Repairs drift between the default account and its siblings. The set of
//! files that should exist everywhere comes from the database (records owned
//! by the default account with a remote copy), not from a remote walk.
//!
//! For each target account and each such record, matched by file name
//! within the target's taxonomy:
//!
//! | Found where                | Action                                     |
//! |----------------------------|--------------------------------------------|
//! | inside any category folder | nothing (`already_present`)                |
//! | directly in the root folder| move into the record's category (`moved`)  |
//! | nowhere                    | copy from the default account (`uploaded`) |
//!
//! Targets run concurrently; files within a target run one at a time, so at
//! most one file per target is buffered in memory. A second run right after
//! a successful one performs no writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use drivemirror_core::domain::{Account, AccountId, FileRecord, FolderHierarchy, RemoteId};
use drivemirror_core::ports::{IRemoteStorage, IStateRepository, RecordFilter, UploadBody};

use crate::credentials::CredentialService;
use crate::taxonomy::TaxonomyResolver;
use crate::SyncError;

/// Per-target counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetReconcileStats {
    pub account_id: AccountId,
    pub email: String,
    pub moved: usize,
    pub uploaded: usize,
    pub already_present: usize,
    pub failed: usize,
    /// Why the whole target was skipped, if it was
    pub skipped: Option<String>,
}

impl TargetReconcileStats {
    fn new(account: &Account) -> Self {
        Self {
            account_id: *account.id(),
            email: account.email().as_str().to_string(),
            ..Self::default()
        }
    }

    /// Files that needed a write on this target
    pub fn reconciled(&self) -> usize {
        self.moved + self.uploaded
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub default_account_id: AccountId,
    /// Number of records checked on every target
    pub files_considered: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetReconcileStats>,
}

impl ReconcileReport {
    pub fn total_reconciled(&self) -> usize {
        self.targets.iter().map(TargetReconcileStats::reconciled).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.targets.iter().map(|t| t.failed).sum()
    }

    pub fn target(&self, account_id: &AccountId) -> Option<&TargetReconcileStats> {
        self.targets.iter().find(|t| &t.account_id == account_id)
    }
}

/// What a target account already holds inside its taxonomy
#[derive(Debug, Default)]
struct TargetListing {
    /// Non-folder children of the root folder, by name
    uncategorized: HashMap<String, RemoteId>,
    /// Names of files inside any category folder
    categorized: HashSet<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    storage: Arc<dyn IRemoteStorage>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
    taxonomy: Arc<TaxonomyResolver>,
    make_public: bool,
}

impl Reconciler {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
        taxonomy: Arc<TaxonomyResolver>,
        make_public: bool,
    ) -> Self {
        Self {
            storage,
            repository,
            credentials,
            taxonomy,
            make_public,
        }
    }

    /// Runs one reconciliation pass to completion
    ///
    /// # Errors
    ///
    /// - `NoDefaultAccount` / `NoSyncTargets` when there is nothing to do
    /// - `CredentialRefreshFailed` or a remote error if the default account
    ///   itself is unusable
    ///
    /// Failures on a target or a single file are counted in the report.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport, SyncError> {
        let started_at = Utc::now();

        let mut default = self
            .repository
            .get_default_account()
            .await?
            .ok_or(SyncError::NoDefaultAccount)?;

        let targets: Vec<Account> = self
            .repository
            .list_active_accounts()
            .await?
            .into_iter()
            .filter(|a| !a.is_default() && a.id() != default.id())
            .collect();
        if targets.is_empty() {
            return Err(SyncError::NoSyncTargets);
        }

        self.credentials.ensure_fresh(&mut default, false).await?;
        let taxonomy = &self.taxonomy;
        let default_id = *default.id();
        self.credentials
            .with_auth_retry(&mut default, |token| async move {
                taxonomy.ensure_hierarchy(&default_id, &token).await
            })
            .await?;

        let records = self
            .repository
            .list_file_records(
                &RecordFilter::new()
                    .with_account_id(*default.id())
                    .remote_only(),
            )
            .await?;

        info!(
            default_account = %default.id(),
            targets = targets.len(),
            files = records.len(),
            "Starting reconciliation"
        );

        let default = Arc::new(default);
        let records = Arc::new(records);
        let mut set = JoinSet::new();
        for target in targets {
            let reconciler = self.clone();
            let default = Arc::clone(&default);
            let records = Arc::clone(&records);
            set.spawn(async move { reconciler.reconcile_target(target, &default, &records).await });
        }

        let mut stats = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(target_stats) => stats.push(target_stats),
                Err(e) => error!(error = %e, "Reconciliation task aborted"),
            }
        }
        stats.sort_by(|a, b| a.email.cmp(&b.email));

        let report = ReconcileReport {
            default_account_id: *default.id(),
            files_considered: records.len(),
            started_at,
            finished_at: Utc::now(),
            targets: stats,
        };

        info!(
            reconciled = report.total_reconciled(),
            failed = report.total_failed(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_target(
        &self,
        mut target: Account,
        default: &Account,
        records: &[FileRecord],
    ) -> TargetReconcileStats {
        let mut stats = TargetReconcileStats::new(&target);

        if let Err(e) = self.credentials.ensure_valid(&mut target).await {
            warn!(target = %target.id(), error = %e, "Skipping target with unusable credentials");
            stats.skipped = Some(e.to_string());
            return stats;
        }

        let (hierarchy, mut listing) = match self.inspect_target(&mut target).await {
            Ok(found) => found,
            Err(e) => {
                warn!(target = %target.id(), error = %e, "Could not inspect target taxonomy");
                stats.skipped = Some(e.to_string());
                return stats;
            }
        };

        // Each task refreshes its own copy of the source account if needed
        let mut source = default.clone();

        for record in records {
            let name = &record.original_name;
            if listing.categorized.contains(name) {
                stats.already_present += 1;
                continue;
            }

            let Some(folder) = hierarchy.folder_for(record.category) else {
                stats.failed += 1;
                continue;
            };

            // Ok(true) when an uncategorized copy was moved, Ok(false) when uploaded
            let result = match listing.uncategorized.remove(name) {
                Some(remote_id) => self
                    .move_into(&mut target, &remote_id, folder)
                    .await
                    .map(|()| true),
                None => self
                    .copy_from_source(&mut source, &mut target, record, folder)
                    .await
                    .map(|()| false),
            };

            match result {
                Ok(moved) => {
                    if moved {
                        stats.moved += 1;
                    } else {
                        stats.uploaded += 1;
                    }
                    listing.categorized.insert(name.clone());
                }
                Err(e) => {
                    warn!(
                        target = %target.id(),
                        record_id = %record.id,
                        file = %name,
                        error = %e,
                        "Failed to reconcile file"
                    );
                    stats.failed += 1;
                }
            }
        }

        debug!(
            target = %target.id(),
            moved = stats.moved,
            uploaded = stats.uploaded,
            already_present = stats.already_present,
            failed = stats.failed,
            "Target reconciled"
        );
        stats
    }

    /// Ensures the hierarchy on a target and lists what it already holds
    async fn inspect_target(
        &self,
        target: &mut Account,
    ) -> Result<(FolderHierarchy, TargetListing), SyncError> {
        let taxonomy = &self.taxonomy;
        let target_id = *target.id();
        let hierarchy = self
            .credentials
            .with_auth_retry(target, |token| async move {
                taxonomy.ensure_hierarchy(&target_id, &token).await
            })
            .await?;

        let storage = &self.storage;
        let mut listing = TargetListing::default();

        let root_id = &hierarchy.root_id;
        let root_children = self
            .credentials
            .with_auth_retry(target, |token| async move {
                storage.list_children(&token, Some(root_id)).await
            })
            .await?;
        for object in root_children.into_iter().filter(|o| !o.is_folder()) {
            listing.uncategorized.entry(object.name).or_insert(object.id);
        }

        for folder in hierarchy.categories.values() {
            let children = self
                .credentials
                .with_auth_retry(target, |token| async move {
                    storage.list_children(&token, Some(folder)).await
                })
                .await?;
            listing
                .categorized
                .extend(children.into_iter().filter(|o| !o.is_folder()).map(|o| o.name));
        }

        Ok((hierarchy, listing))
    }

    async fn move_into(
        &self,
        target: &mut Account,
        remote_id: &RemoteId,
        folder: &RemoteId,
    ) -> Result<(), SyncError> {
        let storage = &self.storage;
        self.credentials
            .with_auth_retry(target, |token| async move {
                storage.move_to_folder(&token, remote_id, folder).await
            })
            .await
    }

    /// Downloads the record from the default account into memory and
    /// uploads it into `folder` on the target
    async fn copy_from_source(
        &self,
        source: &mut Account,
        target: &mut Account,
        record: &FileRecord,
        folder: &RemoteId,
    ) -> Result<(), SyncError> {
        let Some((_, source_id)) = record.remote_location() else {
            return Ok(());
        };

        let storage = &self.storage;
        let download = self
            .credentials
            .with_auth_retry(source, |token| async move {
                storage.download(&token, source_id).await
            })
            .await?;

        let capacity = download.content_length.unwrap_or(record.size_bytes) as usize;
        let content = download
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?
            .freeze();

        let uploaded = self
            .credentials
            .with_auth_retry(target, |token| {
                let body = UploadBody::Bytes(content.clone());
                async move {
                    storage
                        .upload(&token, body, &record.original_name, &record.mime_type, Some(folder))
                        .await
                }
            })
            .await?;

        if self.make_public {
            let id = &uploaded.id;
            if let Err(e) = self
                .credentials
                .with_auth_retry(target, |token| async move {
                    storage.make_public(&token, id).await
                })
                .await
            {
                warn!(remote_id = %uploaded.id, error = %e, "Could not share copy publicly");
            }
        }

        Ok(())
    }
}
