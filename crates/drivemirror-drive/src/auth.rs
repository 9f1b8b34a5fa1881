//! Google OAuth2 token provider
//!
//! Implements [`ITokenProvider`] on top of the `oauth2` crate for the
//! authorization code and refresh grants, plus plain HTTP calls for the
//! Google-specific tokeninfo, revoke and userinfo endpoints.
//!
//! The authorization URL always requests `access_type=offline` and
//! `prompt=consent` so Google returns a refresh token on every link.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use drivemirror_core::config::GoogleConfig;
use drivemirror_core::ports::{ITokenProvider, TokenError, Tokens, UserInfo};
use oauth2::{
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Response from the userinfo endpoint
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    email: Option<String>,
    name: Option<String>,
}

// ============================================================================
// GoogleTokenProvider
// ============================================================================

/// OAuth2 client for Google accounts
pub struct GoogleTokenProvider {
    client: GoogleOAuthClient,
    http: reqwest::Client,
    scopes: Vec<String>,
    revoke_url: String,
    tokeninfo_url: String,
    userinfo_url: String,
}

impl GoogleTokenProvider {
    /// Creates a provider from the `google` configuration section
    pub fn new(config: &GoogleConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?,
            )
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );

        // Token endpoints must not follow redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
            revoke_url: config.revoke_url.clone(),
            tokeninfo_url: config.tokeninfo_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }
}

fn into_tokens(response: &BasicTokenResponse) -> Tokens {
    Tokens {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        expires_at: response
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
    }
}

fn map_request_error<RE: std::error::Error + 'static>(
    err: RequestTokenError<RE, BasicErrorResponse>,
) -> TokenError {
    match err {
        RequestTokenError::ServerResponse(resp) => TokenError::Rejected(resp.to_string()),
        RequestTokenError::Request(e) => TokenError::Transport(e.to_string()),
        RequestTokenError::Parse(e, _) => {
            TokenError::Rejected(format!("unparseable token response: {e}"))
        }
        RequestTokenError::Other(msg) => TokenError::Rejected(msg),
    }
}

fn transport(err: reqwest::Error) -> TokenError {
    TokenError::Transport(err.to_string())
}

#[async_trait]
impl ITokenProvider for GoogleTokenProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut request = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()));
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, _csrf) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        url.to_string()
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<Tokens, TokenError> {
        info!("Exchanging authorization code for tokens");
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(map_request_error)?;

        let tokens = into_tokens(&response);
        if tokens.refresh_token.is_none() {
            warn!("Authorization response did not include a refresh token");
        }
        Ok(tokens)
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, TokenError> {
        if refresh_token.is_empty() {
            return Err(TokenError::MissingRefreshToken);
        }

        debug!("Refreshing access token");
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(map_request_error)?;

        Ok(into_tokens(&response))
    }

    #[instrument(skip_all)]
    async fn validate(&self, access_token: &str) -> Result<bool, TokenError> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(false),
            s => Err(TokenError::Transport(format!("tokeninfo returned {s}"))),
        }
    }

    #[instrument(skip_all)]
    async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let response = self
            .http
            .post(&self.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            info!("Revoked token");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TokenError::Rejected(format!("revoke returned {status}: {body}")))
        }
    }

    #[instrument(skip_all)]
    async fn user_info(&self, access_token: &str) -> Result<UserInfo, TokenError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Rejected(format!("userinfo returned {status}")));
        }

        let info: UserInfoResponse = response.json().await.map_err(transport)?;
        let email = info
            .email
            .ok_or_else(|| TokenError::Rejected("userinfo response has no email".into()))?;

        Ok(UserInfo {
            email,
            display_name: info.name,
        })
    }
}
