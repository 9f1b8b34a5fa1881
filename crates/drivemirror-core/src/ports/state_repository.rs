//! State repository port (driven/secondary port)
//!
//! This module defines the interface for persisting linked accounts and
//! file records.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, etc.) and don't need domain-level classification.
//! - Accounts cross this boundary with plaintext credentials; adapters are
//!   responsible for encrypting them at rest.
//! - The `RecordFilter` struct provides a composable query mechanism
//!   without exposing storage implementation details.

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{AccountId, Email, FileRecordId},
    Account, Category, Credentials, FileRecord,
};

// ============================================================================
// RecordFilter
// ============================================================================

/// Filter criteria for querying file records
///
/// All fields are optional; when unset, no filtering is applied for that
/// field. Multiple filters are combined with AND logic. Results are always
/// ordered by sort position ascending, then creation time descending.
///
/// # Example
///
/// ```
/// use drivemirror_core::domain::{AccountId, Category};
/// use drivemirror_core::ports::RecordFilter;
///
/// // Records stored on a given account, in the manual category
/// let filter = RecordFilter::new()
///     .with_account_id(AccountId::new())
///     .with_category(Category::Manual)
///     .remote_only();
/// assert!(filter.remote_only);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Filter by owning account
    pub account_id: Option<AccountId>,
    /// Filter by category
    pub category: Option<Category>,
    /// Only records with a remote file ID
    pub remote_only: bool,
}

impl RecordFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the owning account filter
    pub fn with_account_id(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Sets the category filter
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Restricts results to records stored on Drive
    pub fn remote_only(mut self) -> Self {
        self.remote_only = true;
        self
    }
}

// ============================================================================
// IStateRepository trait
// ============================================================================

/// Port trait for persistent state storage
///
/// ## Implementation Notes
///
/// - At most one account may be default; `set_default_account` must clear
///   the previous default and set the new one atomically.
/// - Deleting an account referenced by a file record must fail.
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Accounts ---

    /// Saves an account (insert or update by ID)
    async fn save_account(&self, account: &Account) -> anyhow::Result<()>;

    /// Retrieves an account by its ID
    async fn get_account(&self, id: &AccountId) -> anyhow::Result<Option<Account>>;

    /// Retrieves an account by its email address
    async fn find_account_by_email(&self, email: &Email) -> anyhow::Result<Option<Account>>;

    /// Retrieves the default account
    ///
    /// Returns `None` if no account is marked default.
    async fn get_default_account(&self) -> anyhow::Result<Option<Account>>;

    /// Lists all accounts, oldest first
    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>>;

    /// Lists active accounts, oldest first
    async fn list_active_accounts(&self) -> anyhow::Result<Vec<Account>>;

    /// Replaces the stored credentials of an account
    async fn update_credentials(
        &self,
        id: &AccountId,
        credentials: &Credentials,
    ) -> anyhow::Result<()>;

    /// Sets the active flag of an account
    async fn set_account_active(&self, id: &AccountId, active: bool) -> anyhow::Result<()>;

    /// Makes an account the only default (and active) account
    async fn set_default_account(&self, id: &AccountId) -> anyhow::Result<()>;

    /// Deletes an account
    ///
    /// Fails if any file record still references it.
    async fn delete_account(&self, id: &AccountId) -> anyhow::Result<()>;

    // --- File records ---

    /// Saves a file record (insert or update by ID)
    async fn save_file_record(&self, record: &FileRecord) -> anyhow::Result<()>;

    /// Retrieves a file record by its ID
    async fn get_file_record(&self, id: &FileRecordId) -> anyhow::Result<Option<FileRecord>>;

    /// Queries file records matching the filter
    async fn list_file_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<FileRecord>>;

    /// Deletes a file record
    async fn delete_file_record(&self, id: &FileRecordId) -> anyhow::Result<()>;

    /// Atomically increments the download counter
    async fn increment_download_count(
        &self,
        id: &FileRecordId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Returns the sort position for a newly created record
    async fn next_sort_position(&self) -> anyhow::Result<i64>;
}
