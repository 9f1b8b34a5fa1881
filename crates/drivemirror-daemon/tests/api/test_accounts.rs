//! Health and account endpoints

use axum::http::StatusCode;

use crate::common::{error_type, json, TestApp};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_accounts_start_empty() {
    let app = TestApp::new().await;

    let response = app.get("/api/accounts").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_authorize_returns_url_with_state() {
    let app = TestApp::new().await;

    let body = json(app.get("/api/accounts/authorize").await).await;

    let state = body["state"].as_str().unwrap();
    assert!(!state.is_empty());
    assert!(body["url"].as_str().unwrap().ends_with(state));
}

#[tokio::test]
async fn test_callback_links_first_account_as_default() {
    let app = TestApp::new().await;

    let first = app.link("a@example.com").await;
    let second = app.link("b@example.com").await;

    let accounts = json(app.get("/api/accounts").await).await;
    let accounts = accounts.as_array().unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0]["id"], first.as_str());
    assert_eq!(accounts[0]["is_default"], true);
    assert_eq!(accounts[1]["id"], second.as_str());
    assert_eq!(accounts[1]["is_default"], false);
    assert_eq!(accounts[1]["token_expired"], false);
    // Tokens never leave the server
    assert!(accounts[0].get("access_token").is_none());
    assert!(accounts[0].get("credentials").is_none());
}

#[tokio::test]
async fn test_callback_errors() {
    let app = TestApp::new().await;

    let denied = app
        .get("/api/accounts/callback?error=access_denied&state=s")
        .await;
    assert_eq!(denied.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(denied).await, "bad_request");

    let missing = app.get("/api/accounts/callback?state=s").await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let rejected = app
        .get("/api/accounts/callback?code=garbage&state=s")
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(rejected).await, "authorization_rejected");
}

#[tokio::test]
async fn test_default_account_is_locked() {
    let app = TestApp::new().await;
    let id = app.link("a@example.com").await;

    let response = app.post(&format!("/api/accounts/{id}/deactivate")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_type(response).await, "default_account_locked");

    let response = app.delete(&format!("/api/accounts/{id}")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_account_administration() {
    let app = TestApp::new().await;
    let a = app.link("a@example.com").await;
    let b = app.link("b@example.com").await;

    let response = app.post(&format!("/api/accounts/{b}/deactivate")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let accounts = json(app.get("/api/accounts").await).await;
    assert_eq!(accounts[1]["is_active"], false);

    let response = app.post(&format!("/api/accounts/{b}/default")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let accounts = json(app.get("/api/accounts").await).await;
    assert_eq!(accounts[0]["is_default"], false);
    assert_eq!(accounts[1]["is_default"], true);
    assert_eq!(accounts[1]["is_active"], true);

    let response = app.delete(&format!("/api/accounts/{a}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let accounts = json(app.get("/api/accounts").await).await;
    assert_eq!(accounts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_and_unknown_account_ids() {
    let app = TestApp::new().await;

    let response = app.post("/api/accounts/not-a-uuid/activate").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "validation_error");

    let response = app
        .post("/api/accounts/00000000-0000-4000-8000-000000000000/activate")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_type(response).await, "account_not_found");
}
