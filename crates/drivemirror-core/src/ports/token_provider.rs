//! Token provider port (driven/secondary port)
//!
//! This module defines the OAuth operations the engine needs from the
//! identity provider: the authorization code exchange used when linking an
//! account, refresh, validation, revocation and the profile lookup that
//! yields the verified email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Credentials;

/// Errors from the identity provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// There is no refresh credential to exchange
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The provider rejected the grant (revoked, expired, invalid client)
    #[error("Token request rejected: {0}")]
    Rejected(String),

    /// The request could not be completed
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),
}

/// OAuth tokens received from the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for API requests
    pub access_token: String,
    /// Refresh token; `None` when the provider did not rotate it
    pub refresh_token: Option<String>,
    /// When the access token expires, if the provider said so
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Merges these tokens into existing credentials
    ///
    /// The previous refresh token is kept when the provider did not return a
    /// new one.
    pub fn into_credentials(self, previous: &Credentials) -> Credentials {
        Credentials {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous.refresh_token.clone()),
            expires_at: self.expires_at,
        }
    }
}

/// Profile of the user owning a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub display_name: Option<String>,
}

/// Port trait for OAuth token operations
#[async_trait::async_trait]
pub trait ITokenProvider: Send + Sync {
    /// Builds the URL the administrator visits to grant offline access
    fn authorization_url(&self, state: &str) -> String;

    /// Exchanges an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<Tokens, TokenError>;

    /// Exchanges a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, TokenError>;

    /// Returns true if the provider still accepts the access token
    async fn validate(&self, access_token: &str) -> Result<bool, TokenError>;

    /// Revokes a token at the provider
    async fn revoke(&self, token: &str) -> Result<(), TokenError>;

    /// Fetches the profile of the token owner
    async fn user_info(&self, access_token: &str) -> Result<UserInfo, TokenError>;
}
