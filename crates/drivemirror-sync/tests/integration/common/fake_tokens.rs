//! Scripted OAuth provider
//!
//! Refresh tokens are `refresh:<email>` and authorization codes are
//! `code:<email>`. Each successful refresh hands out `token:<email>#<n>`
//! with a one hour lifetime.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};

use drivemirror_core::ports::{ITokenProvider, TokenError, Tokens, UserInfo};

pub fn refresh_token(email: &str) -> String {
    format!("refresh:{email}")
}

pub fn auth_code(email: &str) -> String {
    format!("code:{email}")
}

#[derive(Default)]
struct State {
    rejected: HashSet<String>,
    revoked_access: HashSet<String>,
    generation: u64,
    refreshes: Vec<String>,
    revoked: Vec<String>,
}

#[derive(Default)]
pub struct FakeTokens {
    state: Mutex<State>,
}

impl FakeTokens {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Makes every refresh for this account fail with `invalid_grant`
    pub fn reject(&self, email: &str) {
        self.lock().rejected.insert(email.to_string());
    }

    /// Makes `validate` report this access token as no longer accepted
    pub fn revoke_access(&self, access_token: &str) {
        self.lock().revoked_access.insert(access_token.to_string());
    }

    /// Emails of every refresh attempt, in order
    pub fn refreshes(&self) -> Vec<String> {
        self.lock().refreshes.clone()
    }

    pub fn refresh_count(&self, email: &str) -> usize {
        self.lock().refreshes.iter().filter(|e| *e == email).count()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.lock().revoked.clone()
    }
}

#[async_trait::async_trait]
impl ITokenProvider for FakeTokens {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example/auth?access_type=offline&state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<Tokens, TokenError> {
        let email = code
            .strip_prefix("code:")
            .ok_or_else(|| TokenError::Rejected("invalid_grant".to_string()))?;
        Ok(Tokens {
            access_token: format!("token:{email}"),
            refresh_token: Some(refresh_token(email)),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, TokenError> {
        let email = refresh_token
            .strip_prefix("refresh:")
            .ok_or_else(|| TokenError::Rejected("invalid_grant".to_string()))?
            .to_string();

        let mut state = self.lock();
        state.refreshes.push(email.clone());
        if state.rejected.contains(&email) {
            return Err(TokenError::Rejected("invalid_grant".to_string()));
        }
        state.generation += 1;
        Ok(Tokens {
            access_token: format!("token:{email}#{}", state.generation),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn validate(&self, access_token: &str) -> Result<bool, TokenError> {
        let revoked = self.lock().revoked_access.contains(access_token);
        Ok(access_token.starts_with("token:") && !revoked)
    }

    async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        self.lock().revoked.push(token.to_string());
        Ok(())
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, TokenError> {
        let email = access_token
            .strip_prefix("token:")
            .and_then(|rest| rest.split('#').next())
            .ok_or_else(|| TokenError::Rejected("invalid token".to_string()))?;
        Ok(UserInfo {
            email: email.to_string(),
            display_name: email.split('@').next().map(str::to_string),
        })
    }
}
