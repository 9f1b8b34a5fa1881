//! DriveMirror Sync - multi-account replication engine
//!
//! Provides:
//! - Credential upkeep (proactive refresh, single retry on expired tokens)
//! - Per-account category folder taxonomy
//! - Fan-out replication of new uploads to every active sibling account
//! - On-demand reconciliation of drift between the default account and siblings
//! - Download resolution with cross-account fallback
//!
//! ## Modules
//!
//! - [`tokens`] - Token Lifecycle Manager (refresh decisions, provider calls)
//! - [`credentials`] - Persisted refresh and auth-retry helpers
//! - [`taxonomy`] - Folder taxonomy resolver
//! - [`replication`] - Fan-out replication engine and report log
//! - [`reconcile`] - Synchronization reconciler
//! - [`records`] - File record listing and deletion
//! - [`download`] - Download resolver
//! - [`upload`] - Upload service (default account write + replication trigger)
//! - [`accounts`] - Account linking and administration
//! - [`scheduler`] - Periodic token refresh sweep
//! - [`services`] - Wiring of all of the above from configuration

pub mod accounts;
pub mod credentials;
pub mod download;
pub mod reconcile;
pub mod records;
pub mod replication;
pub mod scheduler;
pub mod services;
pub mod taxonomy;
pub mod tokens;
pub mod upload;

use thiserror::Error;

use drivemirror_core::domain::{AccountId, DomainError, FileRecordId};
use drivemirror_core::ports::{RemoteError, TokenError};

pub use services::Services;

/// Errors that can occur in engine operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The refresh token is missing or was rejected; the account needs re-authorization
    #[error("Credential refresh failed for account {account_id}: {reason}")]
    CredentialRefreshFailed {
        account_id: AccountId,
        reason: String,
    },

    /// No account is marked as default
    #[error("No default account configured")]
    NoDefaultAccount,

    /// There are no active accounts besides the default one
    #[error("No active accounts to synchronize with")]
    NoSyncTargets,

    /// The referenced account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The referenced file record does not exist
    #[error("File not found: {0}")]
    FileNotFound(FileRecordId),

    /// The default account cannot be deactivated or removed
    #[error("Account {0} is the default account")]
    DefaultAccountLocked(AccountId),

    /// The account is deactivated
    #[error("Account {0} is not active")]
    AccountInactive(AccountId),

    /// File records still reference the account
    #[error("Account {0} still owns file records")]
    AccountInUse(AccountId),

    /// A remote storage call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An identity provider call failed outside of a refresh
    #[error("Authorization failed: {0}")]
    Token(#[from] TokenError),

    /// The state repository failed
    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),

    /// Local file I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from drivemirror-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}
