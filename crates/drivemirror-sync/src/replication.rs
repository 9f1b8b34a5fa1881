//! Fan-out replication engine
//!
//! After a file lands on the default account it is copied to every other
//! active account, into the same category folder. Each target runs as its
//! own task; one target failing never affects the others, and the job as a
//! whole always settles into a [`ReplicationReport`].
//!
//! ## Per-target flow
//!
//! 1. Re-read the account; skip it if it was deactivated meanwhile
//! 2. Refresh its credentials if needed; skip it if that fails
//! 3. Ensure the folder hierarchy
//! 4. Upload into the category folder, optionally share it publicly
//!
//! Failed targets are not retried here; reconciliation repairs them.
//!
//! Background jobs are tracked so [`ReplicationEngine::shutdown`] can wait
//! for them before the process exits.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempPath;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use drivemirror_core::domain::{Account, AccountId, Category, DomainError, FileRecordId, RemoteId};
use drivemirror_core::ports::{IRemoteStorage, IStateRepository, UploadBody};

use crate::credentials::CredentialService;
use crate::taxonomy::TaxonomyResolver;
use crate::SyncError;

// ============================================================================
// Job input
// ============================================================================

/// Bytes to replicate
///
/// A staged upload is shared between the default-account upload and every
/// replication task; the temporary file is deleted when the last clone is
/// dropped.
#[derive(Debug, Clone)]
pub enum ReplicaContent {
    Bytes(Bytes),
    Staged { path: Arc<TempPath>, len: u64 },
}

impl ReplicaContent {
    /// Wraps a staged temporary file
    pub fn staged(path: TempPath, len: u64) -> Self {
        ReplicaContent::Staged {
            path: Arc::new(path),
            len,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            ReplicaContent::Bytes(bytes) => bytes.len() as u64,
            ReplicaContent::Staged { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upload body reading from this content
    pub fn body(&self) -> UploadBody {
        match self {
            ReplicaContent::Bytes(bytes) => UploadBody::Bytes(bytes.clone()),
            ReplicaContent::Staged { path, len } => UploadBody::File {
                path: path.to_path_buf(),
                len: *len,
            },
        }
    }
}

/// One file to copy to sibling accounts
#[derive(Debug, Clone)]
pub struct ReplicationJob {
    pub record_id: FileRecordId,
    /// Account already holding the file; never a target
    pub source_account_id: AccountId,
    pub file_name: String,
    pub mime_type: String,
    pub category: Category,
    pub content: ReplicaContent,
}

// ============================================================================
// Outcomes and reports
// ============================================================================

/// Result of replicating to one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplicationOutcome {
    Replicated { remote_id: RemoteId },
    SkippedInactive,
    SkippedTokenExpired { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    pub account_id: AccountId,
    pub email: String,
    #[serde(flatten)]
    pub outcome: ReplicationOutcome,
}

/// All-settled summary of one replication job
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub record_id: FileRecordId,
    pub file_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetResult>,
}

impl ReplicationReport {
    pub fn replicated(&self) -> usize {
        self.count(|o| matches!(o, ReplicationOutcome::Replicated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                ReplicationOutcome::SkippedInactive | ReplicationOutcome::SkippedTokenExpired { .. }
            )
        })
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ReplicationOutcome::Failed { .. }))
    }

    /// Outcome for one target account
    pub fn outcome_for(&self, account_id: &AccountId) -> Option<&ReplicationOutcome> {
        self.targets
            .iter()
            .find(|t| &t.account_id == account_id)
            .map(|t| &t.outcome)
    }

    fn count(&self, pred: impl Fn(&ReplicationOutcome) -> bool) -> usize {
        self.targets.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Bounded history of finished replication jobs, newest last
#[derive(Debug, Clone)]
pub struct ReplicationLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<ReplicationReport>>>,
}

impl ReplicationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.max(1)))),
        }
    }

    pub fn push(&self, report: ReplicationReport) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(report);
    }

    /// Recorded reports, newest first
    pub fn recent(&self) -> Vec<ReplicationReport> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Clone)]
pub struct ReplicationEngine {
    storage: Arc<dyn IRemoteStorage>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
    taxonomy: Arc<TaxonomyResolver>,
    make_public: bool,
    log: ReplicationLog,
    tasks: TaskTracker,
}

impl ReplicationEngine {
    pub fn new(
        storage: Arc<dyn IRemoteStorage>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
        taxonomy: Arc<TaxonomyResolver>,
        make_public: bool,
        log: ReplicationLog,
    ) -> Self {
        Self {
            storage,
            repository,
            credentials,
            taxonomy,
            make_public,
            log,
            tasks: TaskTracker::new(),
        }
    }

    pub fn log(&self) -> &ReplicationLog {
        &self.log
    }

    /// Runs the job in a background task
    ///
    /// The report is logged and appended to the [`ReplicationLog`]; the
    /// handle resolves to it (or `None` if the target list could not be read).
    pub fn spawn(&self, job: ReplicationJob) -> JoinHandle<Option<ReplicationReport>> {
        let engine = self.clone();
        self.tasks.spawn(async move {
            let record_id = job.record_id;
            match engine.replicate(job).await {
                Ok(report) => {
                    engine.log.push(report.clone());
                    Some(report)
                }
                Err(e) => {
                    error!(record_id = %record_id, error = %e, "Replication could not start");
                    None
                }
            }
        })
    }

    /// Waits for every job started with [`spawn`](Self::spawn) to finish
    pub async fn shutdown(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(pending = self.tasks.len(), "Waiting for replication jobs");
        }
        self.tasks.wait().await;
    }

    /// Replicates to every active account except the source and the default,
    /// waiting for all targets to settle
    ///
    /// # Errors
    ///
    /// Only if the account list cannot be read; per-target failures are
    /// reported as outcomes.
    #[instrument(skip(self, job), fields(record_id = %job.record_id, file = %job.file_name))]
    pub async fn replicate(&self, job: ReplicationJob) -> Result<ReplicationReport, SyncError> {
        let started_at = Utc::now();

        let targets: Vec<_> = self
            .repository
            .list_active_accounts()
            .await?
            .into_iter()
            .filter(|a| a.id() != &job.source_account_id && !a.is_default())
            .collect();

        info!(targets = targets.len(), "Starting replication fan-out");

        let job = Arc::new(job);
        let mut set = JoinSet::new();
        for target in targets {
            let engine = self.clone();
            let job = Arc::clone(&job);
            set.spawn(async move {
                let outcome = engine.replicate_to(target.id(), &job).await;
                TargetResult {
                    account_id: *target.id(),
                    email: target.email().as_str().to_string(),
                    outcome,
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Replication task aborted"),
            }
        }
        results.sort_by(|a, b| a.email.cmp(&b.email));

        let report = ReplicationReport {
            record_id: job.record_id,
            file_name: job.file_name.clone(),
            started_at,
            finished_at: Utc::now(),
            targets: results,
        };

        info!(
            replicated = report.replicated(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Replication finished"
        );
        Ok(report)
    }

    async fn replicate_to(&self, account_id: &AccountId, job: &ReplicationJob) -> ReplicationOutcome {
        let mut account = match self.repository.get_account(account_id).await {
            Ok(Some(account)) if account.is_active() => account,
            Ok(_) => {
                info!(target = %account_id, "Target no longer active, skipping");
                return ReplicationOutcome::SkippedInactive;
            }
            Err(e) => {
                return ReplicationOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        };

        if let Err(e) = self.credentials.ensure_valid(&mut account).await {
            warn!(target = %account_id, error = %e, "Target credentials unusable, skipping");
            return ReplicationOutcome::SkippedTokenExpired {
                reason: e.to_string(),
            };
        }

        match self.upload_to(&mut account, job).await {
            Ok(remote_id) => {
                info!(target = %account_id, remote_id = %remote_id, "Replicated");
                ReplicationOutcome::Replicated { remote_id }
            }
            Err(SyncError::CredentialRefreshFailed { reason, .. }) => {
                warn!(target = %account_id, %reason, "Target token rejected mid-replication");
                ReplicationOutcome::SkippedTokenExpired { reason }
            }
            Err(e) => {
                warn!(target = %account_id, error = %e, "Replication to target failed");
                ReplicationOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn upload_to(
        &self,
        account: &mut Account,
        job: &ReplicationJob,
    ) -> Result<RemoteId, SyncError> {
        let taxonomy = &self.taxonomy;
        let account_id = *account.id();
        let hierarchy = self
            .credentials
            .with_auth_retry(account, |token| async move {
                taxonomy.ensure_hierarchy(&account_id, &token).await
            })
            .await?;
        let folder = hierarchy
            .folder_for(job.category)
            .cloned()
            .ok_or_else(|| SyncError::Domain(DomainError::UnknownCategory(job.category.to_string())))?;

        let storage = &self.storage;
        let folder_ref = &folder;
        let uploaded = self
            .credentials
            .with_auth_retry(account, |token| async move {
                storage
                    .upload(
                        &token,
                        job.content.body(),
                        &job.file_name,
                        &job.mime_type,
                        Some(folder_ref),
                    )
                    .await
            })
            .await?;

        if self.make_public {
            let id = &uploaded.id;
            if let Err(e) = self
                .credentials
                .with_auth_retry(account, |token| async move {
                    storage.make_public(&token, id).await
                })
                .await
            {
                warn!(remote_id = %uploaded.id, error = %e, "Could not share replica publicly");
            }
        }

        Ok(uploaded.id)
    }
}
