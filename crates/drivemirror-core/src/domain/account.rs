//! Account domain entity
//!
//! This module defines the Account entity which represents one linked
//! Google Drive account together with its OAuth credentials and its
//! administrative flags (active / default).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    errors::DomainError,
    newtypes::{AccountId, Email},
};

/// OAuth credentials for a linked account
///
/// Values here are always plaintext; encryption happens at the persistence
/// boundary.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived bearer token
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Creates a new set of credentials
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Returns true if the access token is past its expiry
    ///
    /// Credentials without a known expiry are treated as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry < now,
            None => true,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A linked Google Drive account
///
/// Exactly one account may be the default: uploads land there first and it
/// is the authoritative source during reconciliation. Only active accounts
/// receive replicas or serve fallback downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account
    id: AccountId,
    /// Provider-verified email address
    email: Email,
    /// Human-readable label shown in the admin API
    display_name: String,
    /// Current OAuth credentials
    credentials: Credentials,
    /// Whether the account participates in replication and fallback
    is_active: bool,
    /// Whether this is the primary upload target
    is_default: bool,
    /// When this account was linked
    created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a newly linked, active, non-default Account
    pub fn new(email: Email, display_name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id: AccountId::new(),
            email,
            display_name: display_name.into(),
            credentials,
            is_active: true,
            is_default: false,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes an Account from storage
    pub fn with_id(
        id: AccountId,
        email: Email,
        display_name: impl Into<String>,
        credentials: Credentials,
        is_active: bool,
        is_default: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            display_name: display_name.into(),
            credentials,
            is_active,
            is_default,
            created_at,
        }
    }

    // --- Getters ---

    /// Returns the account's unique identifier
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Returns the account's email address
    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Returns the display name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the current credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the plaintext access token
    pub fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Returns when this account was linked
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Derived reporting flag: the access token is expired or has no expiry
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.credentials.is_expired_at(now)
    }

    // --- Mutators ---

    /// Replaces the credentials after a refresh or re-link
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    /// Updates the display name
    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    /// Marks the account active
    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Marks the account inactive
    ///
    /// # Errors
    /// Returns `DomainError::DefaultAccountLocked` for the default account
    pub fn deactivate(&mut self) -> Result<(), DomainError> {
        if self.is_default {
            return Err(DomainError::DefaultAccountLocked(self.id.to_string()));
        }
        self.is_active = false;
        Ok(())
    }

    /// Sets or clears the default flag
    ///
    /// Setting the default also activates the account.
    pub fn set_default(&mut self, is_default: bool) {
        self.is_default = is_default;
        if is_default {
            self.is_active = true;
        }
    }

    /// Checks that this account may be removed
    ///
    /// # Errors
    /// Returns `DomainError::DefaultAccountLocked` for the default account
    pub fn ensure_removable(&self) -> Result<(), DomainError> {
        if self.is_default {
            return Err(DomainError::DefaultAccountLocked(self.id.to_string()));
        }
        Ok(())
    }
}
