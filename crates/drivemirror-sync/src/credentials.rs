//! Refresh-and-persist helpers shared by every engine component
//!
//! [`CredentialService::ensure_fresh`] refreshes an account's token when the
//! [`TokenLifecycleManager`] says so and stores the result right away.
//! [`CredentialService::with_auth_retry`] wraps a single remote call: when the
//! provider answers with an expired-token error the token is force-refreshed
//! and the call is repeated exactly once.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use drivemirror_core::domain::Account;
use drivemirror_core::ports::{IStateRepository, RemoteError};

use crate::tokens::TokenLifecycleManager;
use crate::SyncError;

pub struct CredentialService {
    tokens: Arc<TokenLifecycleManager>,
    repository: Arc<dyn IStateRepository>,
}

impl CredentialService {
    pub fn new(tokens: Arc<TokenLifecycleManager>, repository: Arc<dyn IStateRepository>) -> Self {
        Self { tokens, repository }
    }

    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    /// Refreshes the account's token if it is near expiry (or `force` is set)
    /// and persists the new credentials
    ///
    /// On success `account` carries the fresh credentials.
    pub async fn ensure_fresh(&self, account: &mut Account, force: bool) -> Result<(), SyncError> {
        if !force && !self.tokens.needs_refresh(account, Utc::now()) {
            return Ok(());
        }

        let credentials = self.tokens.refresh(account).await.map_err(|e| {
            warn!(account_id = %account.id(), error = %e, "Token refresh failed");
            e
        })?;

        self.repository
            .update_credentials(account.id(), &credentials)
            .await?;
        account.set_credentials(credentials);

        info!(account_id = %account.id(), forced = force, "Credentials refreshed");
        Ok(())
    }

    /// [`ensure_fresh`](Self::ensure_fresh), then asks the provider whether
    /// the token is still accepted and force-refreshes it if not
    ///
    /// A token revoked before its recorded expiry is caught here instead of
    /// by the first transfer. When the provider cannot be asked the token is
    /// used as is and [`with_auth_retry`](Self::with_auth_retry) remains the
    /// fallback.
    pub async fn ensure_valid(&self, account: &mut Account) -> Result<(), SyncError> {
        self.ensure_fresh(account, false).await?;

        match self.tokens.validate(account.access_token()).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(account_id = %account.id(), "Provider no longer accepts the token");
                self.ensure_fresh(account, true).await
            }
            Err(e) => {
                warn!(account_id = %account.id(), error = %e, "Token validation unavailable");
                Ok(())
            }
        }
    }

    /// Runs `op` with the account's access token, refreshing and retrying
    /// once if the token was rejected
    ///
    /// `op` receives an owned copy of the token so the returned future does
    /// not borrow `account`.
    pub async fn with_auth_retry<T, F, Fut>(&self, account: &mut Account, op: F) -> Result<T, SyncError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match op(account.access_token().to_string()).await {
            Err(RemoteError::AuthExpired) => {
                debug!(account_id = %account.id(), "Access token rejected, refreshing once");
                self.ensure_fresh(account, true).await?;
                Ok(op(account.access_token().to_string()).await?)
            }
            other => Ok(other?),
        }
    }
}
