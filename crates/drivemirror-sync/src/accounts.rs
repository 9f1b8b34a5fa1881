//! Account linking and administration
//!
//! Accounts are linked through the OAuth authorization-code flow. The first
//! linked account becomes the default; linking an email that is already
//! known updates that account's credentials instead of adding a duplicate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use drivemirror_core::domain::{Account, AccountId, Credentials, DomainError, Email};
use drivemirror_core::ports::{IStateRepository, ITokenProvider, RecordFilter};

use crate::credentials::CredentialService;
use crate::SyncError;

/// Where to send the administrator to grant access
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// An account as shown to administrators; never carries tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub id: AccountId,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_default: bool,
    /// Derived: no expiry recorded, or expiry already passed
    pub token_expired: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    pub created_at: DateTime<Utc>,
}

impl AccountStatus {
    pub fn from_account(account: &Account, now: DateTime<Utc>) -> Self {
        let credentials = account.credentials();
        Self {
            id: *account.id(),
            email: account.email().as_str().to_string(),
            display_name: account.display_name().to_string(),
            is_active: account.is_active(),
            is_default: account.is_default(),
            token_expired: account.token_expired(now),
            token_expires_at: credentials.expires_at,
            has_refresh_token: credentials
                .refresh_token
                .as_deref()
                .is_some_and(|t| !t.is_empty()),
            created_at: account.created_at(),
        }
    }
}

/// Result of refreshing one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed { expires_at: Option<DateTime<Utc>> },
    StillValid,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRefreshResult {
    pub account_id: AccountId,
    pub email: String,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

pub struct AccountService {
    provider: Arc<dyn ITokenProvider>,
    repository: Arc<dyn IStateRepository>,
    credentials: Arc<CredentialService>,
}

impl AccountService {
    pub fn new(
        provider: Arc<dyn ITokenProvider>,
        repository: Arc<dyn IStateRepository>,
        credentials: Arc<CredentialService>,
    ) -> Self {
        Self {
            provider,
            repository,
            credentials,
        }
    }

    /// Builds a consent URL with a fresh random state value
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let state = Uuid::new_v4().simple().to_string();
        AuthorizationRequest {
            url: self.provider.authorization_url(&state),
            state,
        }
    }

    /// Completes the OAuth flow and stores the account
    ///
    /// The account is identified by the email the provider reports for the
    /// new token.
    #[instrument(skip(self, code))]
    pub async fn link_account(&self, code: &str) -> Result<Account, SyncError> {
        let tokens = self.provider.exchange_code(code).await?;
        let profile = self.provider.user_info(&tokens.access_token).await?;
        let email = Email::new(profile.email)?;

        let account = match self.repository.find_account_by_email(&email).await? {
            Some(mut existing) => {
                let credentials = tokens.into_credentials(existing.credentials());
                existing.set_credentials(credentials);
                if let Some(name) = profile.display_name.filter(|n| !n.trim().is_empty()) {
                    existing.set_display_name(name);
                }
                self.repository.save_account(&existing).await?;
                info!(account_id = %existing.id(), email = %email, "Re-linked account");
                existing
            }
            None => {
                let first = self.repository.list_accounts().await?.is_empty();
                let display_name = profile
                    .display_name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| email.as_str().to_string());
                let mut account = Account::new(
                    email.clone(),
                    display_name,
                    Credentials::new(tokens.access_token, tokens.refresh_token, tokens.expires_at),
                );
                if account.credentials().refresh_token.is_none() {
                    warn!(email = %email, "Provider returned no refresh token; account cannot self-heal");
                }
                self.repository.save_account(&account).await?;
                if first {
                    self.repository.set_default_account(account.id()).await?;
                    account.set_default(true);
                }
                info!(account_id = %account.id(), email = %email, default = first, "Linked new account");
                account
            }
        };

        Ok(account)
    }

    pub async fn deactivate(&self, id: &AccountId) -> Result<(), SyncError> {
        let mut account = self.load(id).await?;
        account.deactivate().map_err(|e| locked_or(e, id))?;
        self.repository.set_account_active(id, false).await?;
        info!(account_id = %id, "Account deactivated");
        Ok(())
    }

    pub async fn activate(&self, id: &AccountId) -> Result<(), SyncError> {
        self.load(id).await?;
        self.repository.set_account_active(id, true).await?;
        info!(account_id = %id, "Account activated");
        Ok(())
    }

    /// Makes the account the default (activating it if needed)
    pub async fn set_default(&self, id: &AccountId) -> Result<(), SyncError> {
        self.load(id).await?;
        self.repository.set_default_account(id).await?;
        info!(account_id = %id, "Default account changed");
        Ok(())
    }

    /// Deletes a non-default account that owns no file records
    ///
    /// The stored token is revoked with the provider first; a revocation
    /// failure is logged and does not stop the removal.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &AccountId) -> Result<(), SyncError> {
        let account = self.load(id).await?;
        account.ensure_removable().map_err(|e| locked_or(e, id))?;

        let owned = self
            .repository
            .list_file_records(&RecordFilter::new().with_account_id(*id))
            .await?;
        if !owned.is_empty() {
            return Err(SyncError::AccountInUse(*id));
        }

        let credentials = account.credentials();
        let token = credentials
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&credentials.access_token);
        if let Err(e) = self.provider.revoke(token).await {
            warn!(account_id = %id, error = %e, "Token revocation failed, removing anyway");
        }

        self.repository.delete_account(id).await?;
        info!(account_id = %id, "Account removed");
        Ok(())
    }

    /// Every account, oldest first, without credentials
    pub async fn status_list(&self) -> Result<Vec<AccountStatus>, SyncError> {
        let now = Utc::now();
        Ok(self
            .repository
            .list_accounts()
            .await?
            .iter()
            .map(|a| AccountStatus::from_account(a, now))
            .collect())
    }

    /// Refreshes every active account that needs it, or all of them if `force`
    #[instrument(skip(self))]
    pub async fn refresh_all(&self, force: bool) -> Result<Vec<AccountRefreshResult>, SyncError> {
        let accounts = self.repository.list_active_accounts().await?;
        let mut results = Vec::with_capacity(accounts.len());

        for mut account in accounts {
            let outcome = if force || self.credentials.tokens().needs_refresh(&account, Utc::now()) {
                match self.credentials.ensure_fresh(&mut account, true).await {
                    Ok(()) => RefreshOutcome::Refreshed {
                        expires_at: account.credentials().expires_at,
                    },
                    Err(e) => RefreshOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            } else {
                RefreshOutcome::StillValid
            };

            results.push(AccountRefreshResult {
                account_id: *account.id(),
                email: account.email().as_str().to_string(),
                outcome,
            });
        }

        let failed = results
            .iter()
            .filter(|r| matches!(r.outcome, RefreshOutcome::Failed { .. }))
            .count();
        info!(accounts = results.len(), failed, "Token refresh pass finished");
        Ok(results)
    }

    async fn load(&self, id: &AccountId) -> Result<Account, SyncError> {
        self.repository
            .get_account(id)
            .await?
            .ok_or(SyncError::AccountNotFound(*id))
    }
}

fn locked_or(error: DomainError, id: &AccountId) -> SyncError {
    match error {
        DomainError::DefaultAccountLocked(_) => SyncError::DefaultAccountLocked(*id),
        other => SyncError::Domain(other),
    }
}
