//! Integration tests for Drive file operations

use std::io::Write;

use bytes::Bytes;
use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{IRemoteStorage, RemoteDownload, RemoteError, UploadBody};
use futures_util::StreamExt;
use wiremock::{
    matchers::{body_json, body_string, header, method, path, query_param, query_param_is_missing},
    Mock, ResponseTemplate,
};

use crate::common::{self, TOKEN};

fn rid(id: &str) -> RemoteId {
    RemoteId::new(id).unwrap()
}

async fn read_all(download: RemoteDownload) -> Vec<u8> {
    let mut stream = download.stream;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk.expect("chunk"));
    }
    buf
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_upload_bytes_into_folder() {
    let (server, storage) = common::setup_drive_mock().await;
    common::mount_resumable_upload(&server, "s1", "file-001", "manual.pdf", 11).await;

    let uploaded = storage
        .upload(
            TOKEN,
            UploadBody::Bytes(Bytes::from_static(b"hello drive")),
            "manual.pdf",
            "application/pdf",
            Some(&rid("folder-manual")),
        )
        .await
        .expect("upload failed");

    assert_eq!(uploaded.id.as_str(), "file-001");
    assert_eq!(uploaded.name, "manual.pdf");
    assert_eq!(uploaded.size, Some(11));

    // Metadata leg carried the parent folder
    let requests = server.received_requests().await.unwrap();
    let session: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(session["name"], "manual.pdf");
    assert_eq!(session["mimeType"], "application/pdf");
    assert_eq!(session["parents"], serde_json::json!(["folder-manual"]));
    assert_eq!(
        requests[0].headers.get("X-Upload-Content-Length").unwrap(),
        "11"
    );
    assert_eq!(requests[1].body, b"hello drive");
}

#[tokio::test]
async fn test_upload_streams_file_from_disk() {
    let (server, storage) = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/upload/session/disk", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/disk"))
        .and(body_string("staged content on disk"))
        .and(header("content-length", "22"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "disk-001",
            "name": "fw.bin",
            "size": "22"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut staged = tempfile::NamedTempFile::new().unwrap();
    staged.write_all(b"staged content on disk").unwrap();
    staged.flush().unwrap();

    let uploaded = storage
        .upload(
            TOKEN,
            UploadBody::File {
                path: staged.path().to_path_buf(),
                len: 22,
            },
            "fw.bin",
            "application/octet-stream",
            None,
        )
        .await
        .expect("upload failed");

    assert_eq!(uploaded.id.as_str(), "disk-001");
}

#[tokio::test]
async fn test_upload_session_without_location_fails() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = storage
        .upload(
            TOKEN,
            UploadBody::Bytes(Bytes::from_static(b"x")),
            "x.bin",
            "application/octet-stream",
            None,
        )
        .await;

    assert!(matches!(result, Err(RemoteError::OperationFailed(_))));
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_streams_content() {
    let (server, storage) = common::setup_drive_mock().await;
    let content: Vec<u8> = (0..262_144).map(|i| (i % 251) as u8).collect();
    common::mount_download(&server, "dl-001", &content).await;

    let download = storage.download(TOKEN, &rid("dl-001")).await.unwrap();
    assert_eq!(download.content_length, Some(content.len() as u64));
    assert_eq!(read_all(download).await, content);
}

#[tokio::test]
async fn test_download_401_is_auth_expired() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/dl-002"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .mount(&server)
        .await;

    let err = storage.download(TOKEN, &rid("dl-002")).await.unwrap_err();
    assert_eq!(err, RemoteError::AuthExpired);
}

#[tokio::test]
async fn test_download_404_is_not_found() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = storage.download(TOKEN, &rid("missing")).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
}

#[tokio::test]
async fn test_quota_error_is_operation_failed() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/q1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {"code": 403, "message": "The download quota for this file has been exceeded."}
        })))
        .mount(&server)
        .await;

    let err = storage.download(TOKEN, &rid("q1")).await.unwrap_err();
    assert!(matches!(err, RemoteError::OperationFailed(msg) if msg.contains("quota")));
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn test_list_all_single_page() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "trashed = false"))
        .and(query_param("pageSize", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                common::drive_file("a1", "one.bin", 10, &["root-id"]),
                common::drive_file("a2", "two.bin", 20, &["folder-x"])
            ],
            "nextPageToken": "ignored"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let files = storage.list_all(TOKEN, 1000).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[1].name, "two.bin");
    assert_eq!(files[1].size, Some(20));
}

#[tokio::test]
async fn test_list_children_of_root_follows_pages() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'root' in parents and trashed = false"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::drive_file("c1", "first", 1, &["root-id"])],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::drive_file("c2", "second", 2, &["root-id"])]
        })))
        .mount(&server)
        .await;

    let children = storage.list_children(TOKEN, None).await.unwrap();
    let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[tokio::test]
async fn test_list_children_scoped_to_parent() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'folder-9' in parents and trashed = false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let children = storage
        .list_children(TOKEN, Some(&rid("folder-9")))
        .await
        .unwrap();
    assert!(children.is_empty());
}

// ============================================================================
// Folders, moves, permissions, deletes
// ============================================================================

#[tokio::test]
async fn test_create_folder_under_parent() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_json(serde_json::json!({
            "name": "Hotel IPTV",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["root-folder"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "hotel-folder"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = storage
        .create_folder(TOKEN, "Hotel IPTV", Some(&rid("root-folder")))
        .await
        .unwrap();
    assert_eq!(id.as_str(), "hotel-folder");
}

#[tokio::test]
async fn test_move_to_folder_replaces_parents() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::drive_file("f1", "a.bin", 5, &["old-parent"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("addParents", "new-parent"))
        .and(query_param("removeParents", "old-parent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "f1",
            "parents": ["new-parent"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    storage
        .move_to_folder(TOKEN, &rid("f1"), &rid("new-parent"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_make_public_grants_anyone_reader() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/f2/permissions"))
        .and(body_json(serde_json::json!({"role": "reader", "type": "anyone"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "anyoneWithLink"
        })))
        .expect(1)
        .mount(&server)
        .await;

    storage.make_public(TOKEN, &rid("f2")).await.unwrap();
}

#[tokio::test]
async fn test_delete_sends_bearer_token() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/f3"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    storage.delete(TOKEN, &rid("f3")).await.unwrap();
}

#[tokio::test]
async fn test_get_metadata_parses_fields() {
    let (server, storage) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/m1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::drive_file("m1", "meta.bin", 77, &["p"])),
        )
        .mount(&server)
        .await;

    let meta = storage.get_metadata(TOKEN, &rid("m1")).await.unwrap();
    assert_eq!(meta.name, "meta.bin");
    assert_eq!(meta.size, Some(77));
    assert!(meta.has_parent(&rid("p")));
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let server = wiremock::MockServer::start().await;
    let storage = drivemirror_drive::GoogleDriveStorage::new(
        drivemirror_drive::DriveClient::with_base_url(server.uri()).with_max_retries(1),
    );

    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/t1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/t1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    storage.delete(TOKEN, &rid("t1")).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
