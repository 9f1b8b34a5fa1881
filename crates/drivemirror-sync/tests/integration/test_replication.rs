//! Fan-out of new files to the secondary accounts

use std::io::Write;

use bytes::Bytes;
use chrono::{Duration, Utc};

use drivemirror_core::domain::{Account, Category, FileRecordId};
use drivemirror_sync::replication::{ReplicaContent, ReplicationJob, ReplicationOutcome};

use crate::common::{access_token, upload_request, Harness, ROOT_FOLDER};

fn job(source: &Account, name: &str, content: &[u8]) -> ReplicationJob {
    ReplicationJob {
        record_id: FileRecordId::new(),
        source_account_id: *source.id(),
        file_name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        category: Category::Hotel,
        content: ReplicaContent::Bytes(Bytes::copy_from_slice(content)),
    }
}

#[tokio::test]
async fn test_upload_lands_in_secondary_category_folder() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    let content = vec![7u8; 10 * 1024 * 1024];

    let result = h
        .services
        .uploads
        .upload(upload_request("guide.pdf", Category::Manual, &content))
        .await
        .unwrap();
    assert_eq!(result.record.remote_account_id, Some(*a.id()));

    let report = result.replication.unwrap().await.unwrap().unwrap();
    let Some(ReplicationOutcome::Replicated { remote_id }) = report.outcome_for(b.id()) else {
        panic!("unexpected outcome: {:?}", report.targets);
    };

    let replica = h.drive.get("b@example.com", remote_id.as_str()).unwrap();
    assert_eq!(replica.name, "guide.pdf");
    assert_eq!(replica.content.len(), content.len());
    assert!(replica.public);
    assert_eq!(
        h.drive.folder_path("b@example.com", remote_id.as_str()),
        vec![ROOT_FOLDER.to_string(), "Manual".to_string()]
    );

    // The default account is never a replication target
    assert!(report.outcome_for(a.id()).is_none());
    assert_eq!(h.drive.files_named("a@example.com", "guide.pdf").len(), 1);

    let log = h.services.replication_log().recent();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].record_id, result.record.id);
}

#[tokio::test]
async fn test_one_rejected_target_does_not_stop_others() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    let c = h
        .add_account_expiring("c@example.com", false, Some(Utc::now() - Duration::minutes(5)))
        .await;
    let d = h.add_account("d@example.com", false).await;
    h.tokens.reject("c@example.com");

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 3);
    assert_eq!(report.replicated(), 2);
    assert!(matches!(
        report.outcome_for(b.id()),
        Some(ReplicationOutcome::Replicated { .. })
    ));
    assert!(matches!(
        report.outcome_for(c.id()),
        Some(ReplicationOutcome::SkippedTokenExpired { .. })
    ));
    assert!(matches!(
        report.outcome_for(d.id()),
        Some(ReplicationOutcome::Replicated { .. })
    ));
    assert_eq!(h.drive.calls("c@example.com"), 0);
    assert_eq!(h.drive.files_named("d@example.com", "firmware.bin").len(), 1);
}

#[tokio::test]
async fn test_token_rejected_mid_replication_is_skipped() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    // Expiry looks fine locally, but the drive refuses the token and the
    // provider refuses the refresh
    h.drive.expire_token(&access_token("b@example.com"));
    h.tokens.reject("b@example.com");

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(b.id()),
        Some(ReplicationOutcome::SkippedTokenExpired { .. })
    ));
    assert_eq!(report.skipped(), 1);
}

#[tokio::test]
async fn test_revoked_token_is_replaced_before_transfer() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    // Not near expiry, but the provider no longer accepts it
    h.tokens.revoke_access(&access_token("b@example.com"));
    h.drive.expire_token(&access_token("b@example.com"));

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(b.id()),
        Some(ReplicationOutcome::Replicated { .. })
    ));
    assert_eq!(h.tokens.refresh_count("b@example.com"), 1);
    // Every drive call used the replacement token, none was refused
    assert_eq!(
        h.drive.calls("b@example.com"),
        h.drive.writes("b@example.com") + 2
    );
    assert_ne!(
        h.account(b.id()).await.access_token(),
        access_token("b@example.com")
    );
}

#[tokio::test]
async fn test_revoked_token_without_refresh_sends_nothing() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    h.tokens.revoke_access(&access_token("b@example.com"));
    h.tokens.reject("b@example.com");

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(b.id()),
        Some(ReplicationOutcome::SkippedTokenExpired { .. })
    ));
    assert_eq!(h.drive.calls("b@example.com"), 0);
    assert!(h.drive.files_named("b@example.com", "firmware.bin").is_empty());
}

#[tokio::test]
async fn test_inactive_accounts_are_not_targets() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    let c = h.add_account("c@example.com", false).await;
    h.deactivate(&b).await;

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].account_id, *c.id());
    assert_eq!(h.drive.calls("b@example.com"), 0);
}

#[tokio::test]
async fn test_failed_upload_is_reported_per_target() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    let c = h.add_account("c@example.com", false).await;
    h.drive.fail_uploads("b@example.com");

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(b.id()),
        Some(ReplicationOutcome::Failed { error }) if error.contains("quota")
    ));
    assert!(matches!(
        report.outcome_for(c.id()),
        Some(ReplicationOutcome::Replicated { .. })
    ));
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn test_source_account_is_excluded() {
    let h = Harness::new().await;
    let _a = h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;
    let c = h.add_account("c@example.com", false).await;

    let report = h
        .services
        .replication
        .replicate(job(&b, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].account_id, *c.id());
    assert_eq!(h.drive.calls("a@example.com"), 0);
}

#[tokio::test]
async fn test_no_targets_yields_empty_report() {
    let h = Harness::new().await;
    let a = h.add_account("a@example.com", true).await;

    let report = h
        .services
        .replication
        .replicate(job(&a, "firmware.bin", b"firmware"))
        .await
        .unwrap();

    assert!(report.targets.is_empty());
    assert_eq!(report.replicated(), 0);
}

#[tokio::test]
async fn test_staged_file_is_removed_after_replication() {
    let h = Harness::new().await;
    h.add_account("a@example.com", true).await;
    let b = h.add_account("b@example.com", false).await;

    let mut staged = tempfile::NamedTempFile::new().unwrap();
    staged.write_all(b"staged payload").unwrap();
    let temp_path = staged.into_temp_path();
    let path = temp_path.to_path_buf();

    let mut request = upload_request("staged.bin", Category::Diskless, b"");
    request.content = ReplicaContent::staged(temp_path, 14);

    let result = h.services.uploads.upload(request).await.unwrap();
    assert_eq!(result.record.size_bytes, 14);

    let report = result.replication.unwrap().await.unwrap().unwrap();
    let Some(ReplicationOutcome::Replicated { remote_id }) = report.outcome_for(b.id()) else {
        panic!("unexpected outcome: {:?}", report.targets);
    };
    let replica = h.drive.get("b@example.com", remote_id.as_str()).unwrap();
    assert_eq!(&replica.content[..], b"staged payload");

    assert!(!path.exists());
}

#[tokio::test]
async fn test_replication_log_keeps_newest_first() {
    let h = Harness::new().await;
    h.add_account("a@example.com", true).await;
    h.add_account("b@example.com", false).await;

    for name in ["one.bin", "two.bin"] {
        let result = h
            .services
            .uploads
            .upload(upload_request(name, Category::Other, b"x"))
            .await
            .unwrap();
        result.replication.unwrap().await.unwrap();
    }

    let names: Vec<_> = h
        .services
        .replication_log()
        .recent()
        .into_iter()
        .map(|r| r.file_name)
        .collect();
    assert_eq!(names, vec!["two.bin", "one.bin"]);
}

#[tokio::test]
async fn test_shutdown_waits_for_background_replication() {
    let h = Harness::new().await;
    h.add_account("a@example.com", true).await;
    h.add_account("b@example.com", false).await;

    let result = h
        .services
        .uploads
        .upload(upload_request("guide.pdf", Category::Manual, b"%PDF guide"))
        .await
        .unwrap();
    // Nobody waits on the handle, as with an HTTP upload
    drop(result.replication);

    h.services.shutdown().await;

    assert_eq!(h.services.replication_log().len(), 1);
    assert_eq!(h.drive.files_named("b@example.com", "guide.pdf").len(), 1);
}
