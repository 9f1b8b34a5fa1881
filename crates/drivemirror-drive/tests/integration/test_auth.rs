//! Integration tests for the Google token provider

use drivemirror_core::ports::{ITokenProvider, TokenError};
use drivemirror_drive::GoogleTokenProvider;
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

async fn setup() -> (MockServer, GoogleTokenProvider) {
    let server = MockServer::start().await;
    let provider = GoogleTokenProvider::new(&common::google_config(&server)).unwrap();
    (server, provider)
}

#[tokio::test]
async fn test_refresh_returns_new_access_token() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://www.googleapis.com/auth/drive"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = provider.refresh("rt-1").await.unwrap();
    assert_eq!(tokens.access_token, "at-2");
    // Google does not rotate refresh tokens on refresh
    assert!(tokens.refresh_token.is_none());
    let expires_at = tokens.expires_at.expect("expiry");
    assert!(expires_at > chrono::Utc::now() + chrono::Duration::minutes(55));
}

#[tokio::test]
async fn test_refresh_rejected_grant() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = provider.refresh("revoked").await.unwrap_err();
    assert!(matches!(err, TokenError::Rejected(msg) if msg.contains("invalid_grant")));
}

#[tokio::test]
async fn test_exchange_code() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = provider.exchange_code("auth-code").await.unwrap();
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
}

#[tokio::test]
async fn test_validate_token() {
    let (server, provider) = setup().await;
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", "good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "expires_in": "3000"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", "bad"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error_description": "Invalid Value"
        })))
        .mount(&server)
        .await;

    assert!(provider.validate("good").await.unwrap());
    assert!(!provider.validate("bad").await.unwrap());
}

#[tokio::test]
async fn test_revoke() {
    let (server, provider) = setup().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=rt-9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    provider.revoke("rt-9").await.unwrap();
}

#[tokio::test]
async fn test_user_info() {
    let (server, provider) = setup().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v2/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1234",
            "email": "Mirror.Two@example.com",
            "verified_email": true,
            "name": "Mirror Two"
        })))
        .mount(&server)
        .await;

    let info = provider.user_info("at-1").await.unwrap();
    assert_eq!(info.email, "Mirror.Two@example.com");
    assert_eq!(info.display_name.as_deref(), Some("Mirror Two"));
}

#[tokio::test]
async fn test_user_info_unauthorized() {
    let (server, provider) = setup().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v2/userinfo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(matches!(
        provider.user_info("expired").await,
        Err(TokenError::Rejected(_))
    ));
}
