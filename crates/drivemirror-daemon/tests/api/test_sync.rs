//! Reconciliation, replication history and token refresh

use std::time::Duration;

use axum::http::StatusCode;

use crate::common::{error_type, json, TestApp};

#[tokio::test]
async fn test_reconcile_requires_accounts() {
    let app = TestApp::new().await;

    let response = app.post("/api/sync/reconcile").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_type(response).await, "no_default_account");

    app.link("a@example.com").await;
    let response = app.post("/api/sync/reconcile").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_type(response).await, "no_sync_targets");
}

#[tokio::test]
async fn test_reconcile_copies_missing_files() {
    let app = TestApp::new().await;
    app.link("a@example.com").await;
    let b = app.link("b@example.com").await;
    app.post(&format!("/api/accounts/{b}/deactivate")).await;

    // Uploaded while B is inactive, so nothing is replicated to it
    let response = app
        .upload(
            &[("title", "Setup"), ("category", "hotel")],
            Some(("setup.exe", b"MZ installer")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(app.drive.file_names("b@example.com").is_empty());

    app.post(&format!("/api/accounts/{b}/activate")).await;
    let response = app.post("/api/sync/reconcile").await;

    assert_eq!(response.status(), StatusCode::OK);
    let report = json(response).await;
    let targets = report["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["account_id"], b.as_str());
    assert_eq!(targets[0]["uploaded"], 1);
    assert_eq!(app.drive.file_names("b@example.com"), vec!["setup.exe"]);
}

#[tokio::test]
async fn test_replication_history() {
    let app = TestApp::new().await;
    let response = app.get("/api/sync/replications").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await, serde_json::json!([]));

    app.link("a@example.com").await;
    let b = app.link("b@example.com").await;
    let response = app
        .upload(
            &[("title", "Driver"), ("category", "pcroom")],
            Some(("driver.zip", b"PK driver")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let mut history = serde_json::Value::Null;
    for _ in 0..100 {
        history = json(app.get("/api/sync/replications").await).await;
        if !history.as_array().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let reports = history.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["file_name"], "driver.zip");
    assert_eq!(reports[0]["targets"][0]["account_id"], b.as_str());
    assert_eq!(app.drive.file_names("b@example.com"), vec!["driver.zip"]);
}

#[tokio::test]
async fn test_token_refresh_endpoint() {
    let app = TestApp::new().await;
    app.link("a@example.com").await;
    app.link("b@example.com").await;

    let forced = json(app.post("/api/tokens/refresh").await).await;
    let forced = forced.as_array().unwrap();
    assert_eq!(forced.len(), 2);
    assert!(forced.iter().all(|r| r["status"] == "refreshed"));

    // Freshly refreshed tokens are far from expiry
    let lazy = json(app.post("/api/tokens/refresh?force=false").await).await;
    assert!(lazy
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] == "still_valid"));
}
