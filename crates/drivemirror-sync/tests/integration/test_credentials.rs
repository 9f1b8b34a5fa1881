//! Credential refresh, persistence and the single auth retry

use chrono::{Duration, Utc};

use drivemirror_core::ports::{IRemoteStorage, RemoteError};
use drivemirror_sync::SyncError;

use crate::common::{access_token, Harness};

const EMAIL: &str = "a@example.com";

#[tokio::test]
async fn test_ensure_fresh_refreshes_inside_margin_and_persists() {
    let h = Harness::new().await;
    let mut account = h
        .add_account_expiring(EMAIL, true, Some(Utc::now() + Duration::minutes(5)))
        .await;

    h.services
        .credentials
        .ensure_fresh(&mut account, false)
        .await
        .unwrap();

    assert_eq!(account.access_token(), "token:a@example.com#1");
    let stored = h.account(account.id()).await;
    assert_eq!(stored.access_token(), "token:a@example.com#1");
    // Provider did not rotate the refresh token, so the old one is kept
    assert_eq!(
        stored.credentials().refresh_token.as_deref(),
        Some("refresh:a@example.com")
    );
    assert!(!h.services.credentials.tokens().needs_refresh(&stored, Utc::now()));
}

#[tokio::test]
async fn test_ensure_fresh_leaves_valid_token_alone() {
    let h = Harness::new().await;
    let mut account = h.add_account(EMAIL, true).await;

    h.services
        .credentials
        .ensure_fresh(&mut account, false)
        .await
        .unwrap();

    assert_eq!(account.access_token(), access_token(EMAIL));
    assert!(h.tokens.refreshes().is_empty());
}

#[tokio::test]
async fn test_unknown_expiry_counts_as_expired() {
    let h = Harness::new().await;
    let mut account = h.add_account_expiring(EMAIL, true, None).await;

    h.services
        .credentials
        .ensure_fresh(&mut account, false)
        .await
        .unwrap();

    assert_eq!(h.tokens.refresh_count(EMAIL), 1);
}

#[tokio::test]
async fn test_rejected_refresh_is_reported() {
    let h = Harness::new().await;
    h.tokens.reject(EMAIL);
    let mut account = h
        .add_account_expiring(EMAIL, true, Some(Utc::now() - Duration::minutes(1)))
        .await;

    let err = h
        .services
        .credentials
        .ensure_fresh(&mut account, false)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CredentialRefreshFailed { .. }), "{err}");
    // The stored credentials are untouched
    assert_eq!(h.account(account.id()).await.access_token(), access_token(EMAIL));
}

#[tokio::test]
async fn test_auth_retry_refreshes_once_and_succeeds() {
    let h = Harness::new().await;
    let mut account = h.add_account(EMAIL, true).await;
    h.drive.expire_token(&access_token(EMAIL));

    let storage = &h.drive;
    let listing = h
        .services
        .credentials
        .with_auth_retry(&mut account, |token| async move {
            storage.list_children(&token, None).await
        })
        .await
        .unwrap();

    assert!(listing.is_empty());
    assert_eq!(h.tokens.refresh_count(EMAIL), 1);
    assert_eq!(h.drive.calls(EMAIL), 2);
    assert_eq!(
        h.account(account.id()).await.access_token(),
        "token:a@example.com#1"
    );
}

#[tokio::test]
async fn test_auth_retry_gives_up_after_one_retry() {
    let h = Harness::new().await;
    let mut account = h.add_account(EMAIL, true).await;
    h.drive.expire_token(&access_token(EMAIL));
    h.drive.expire_token("token:a@example.com#1");

    let storage = &h.drive;
    let err = h
        .services
        .credentials
        .with_auth_retry(&mut account, |token| async move {
            storage.list_children(&token, None).await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(RemoteError::AuthExpired)), "{err}");
    assert_eq!(h.tokens.refresh_count(EMAIL), 1);
    assert_eq!(h.drive.calls(EMAIL), 2);
}

#[tokio::test]
async fn test_auth_retry_with_rejected_refresh() {
    let h = Harness::new().await;
    let mut account = h.add_account(EMAIL, true).await;
    h.drive.expire_token(&access_token(EMAIL));
    h.tokens.reject(EMAIL);

    let storage = &h.drive;
    let err = h
        .services
        .credentials
        .with_auth_retry(&mut account, |token| async move {
            storage.list_children(&token, None).await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CredentialRefreshFailed { .. }), "{err}");
    assert_eq!(h.drive.calls(EMAIL), 1);
}

#[tokio::test]
async fn test_other_remote_errors_are_not_retried() {
    let h = Harness::new().await;
    let mut account = h.add_account(EMAIL, true).await;
    h.drive.set_unreachable(EMAIL);

    let storage = &h.drive;
    let err = h
        .services
        .credentials
        .with_auth_retry(&mut account, |token| async move {
            storage.list_children(&token, None).await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(RemoteError::OperationFailed(_))), "{err}");
    assert!(h.tokens.refreshes().is_empty());
    assert_eq!(h.drive.calls(EMAIL), 1);
}
