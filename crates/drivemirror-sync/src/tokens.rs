//! Token Lifecycle Manager
//!
//! Decides when an account's access token must be refreshed and performs
//! the refresh through the identity provider. The manager never persists;
//! see [`CredentialService`](crate::credentials::CredentialService) for the
//! refresh-and-store helper.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use drivemirror_core::config::TokensConfig;
use drivemirror_core::domain::{Account, Credentials};
use drivemirror_core::ports::{ITokenProvider, TokenError};

use crate::SyncError;

/// Default safety margin before expiry at which a token is refreshed
pub const DEFAULT_REFRESH_MARGIN_MINUTES: i64 = 15;

/// Refresh policy plus access to the identity provider
pub struct TokenLifecycleManager {
    provider: Arc<dyn ITokenProvider>,
    margin: Duration,
}

impl TokenLifecycleManager {
    /// Creates a manager that refreshes tokens `margin` before they expire
    pub fn new(provider: Arc<dyn ITokenProvider>, margin: Duration) -> Self {
        Self { provider, margin }
    }

    /// Creates a manager using the configured refresh margin
    pub fn from_config(provider: Arc<dyn ITokenProvider>, config: &TokensConfig) -> Self {
        Self::new(
            provider,
            Duration::minutes(i64::from(config.refresh_margin_minutes)),
        )
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    pub fn provider(&self) -> &Arc<dyn ITokenProvider> {
        &self.provider
    }

    /// Returns true if the account's token has no known expiry or expires
    /// within the margin (a token expiring exactly at the margin is refreshed)
    pub fn needs_refresh(&self, account: &Account, now: DateTime<Utc>) -> bool {
        match account.credentials().expires_at {
            Some(expiry) => expiry - now <= self.margin,
            None => true,
        }
    }

    /// Exchanges the stored refresh token for fresh credentials
    ///
    /// The returned credentials keep the previous refresh token unless the
    /// provider rotated it.
    ///
    /// # Errors
    ///
    /// `SyncError::CredentialRefreshFailed` if no refresh token is stored or
    /// the provider refuses it.
    pub async fn refresh(&self, account: &Account) -> Result<Credentials, SyncError> {
        let refresh_token = account
            .credentials()
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::CredentialRefreshFailed {
                account_id: *account.id(),
                reason: TokenError::MissingRefreshToken.to_string(),
            })?;

        let tokens = self.provider.refresh(refresh_token).await.map_err(|e| {
            SyncError::CredentialRefreshFailed {
                account_id: *account.id(),
                reason: e.to_string(),
            }
        })?;

        debug!(
            account_id = %account.id(),
            expires_at = ?tokens.expires_at,
            "Access token refreshed"
        );
        Ok(tokens.into_credentials(account.credentials()))
    }

    /// Asks the provider whether an access token is currently accepted
    pub async fn validate(&self, access_token: &str) -> Result<bool, SyncError> {
        Ok(self.provider.validate(access_token).await?)
    }
}
