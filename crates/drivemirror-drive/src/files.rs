//! File operations for the Google Drive v3 API
//!
//! Provides functions for:
//! - [`upload_resumable`] - Resumable upload session, body streamed from memory or disk
//! - [`download`] - Streaming media download
//! - [`list_all`] / [`list_children`] - File listings
//! - [`create_folder`] / [`move_to_folder`] - Folder management
//! - [`make_public`] / [`delete`] / [`get_metadata`]
//!
//! ## Drive API References
//!
//! - [Resumable upload](https://developers.google.com/drive/api/guides/manage-uploads#resumable)
//! - [files.list](https://developers.google.com/drive/api/v3/reference/files/list)

use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{
    RemoteDownload, RemoteError, RemoteObject, UploadBody, UploadedObject, FOLDER_MIME_TYPE,
};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{header, Body, Method};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{
    client::{DriveClient, FILES_PATH, UPLOAD_PATH},
    types::{CreateFileRequest, DriveFile, FilesListResponse, PermissionRequest, FILE_FIELDS},
    DriveError,
};

/// Maximum page size accepted by files.list
const MAX_PAGE_SIZE: u32 = 1000;

/// Escapes a literal for use inside a single-quoted Drive query string
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ============================================================================
// Upload
// ============================================================================

/// Uploads a file through a resumable upload session
///
/// 1. `POST /upload/drive/v3/files?uploadType=resumable` with the metadata,
///    which returns the session URI in the `Location` header.
/// 2. `PUT <session URI>` with the content.
pub async fn upload_resumable(
    client: &DriveClient,
    token: &str,
    body: UploadBody,
    name: &str,
    mime_type: &str,
    parent: Option<&RemoteId>,
) -> Result<UploadedObject, DriveError> {
    let len = body.len();
    let metadata = CreateFileRequest {
        name,
        mime_type,
        parents: parent.map(|p| vec![p.as_str()]).unwrap_or_default(),
    };

    debug!(name, size = len, "Creating resumable upload session");

    let path = format!("{UPLOAD_PATH}?uploadType=resumable&fields=id,name,size");
    let session = client
        .execute_with_retry(
            client
                .request(Method::POST, &path, token)
                .header("X-Upload-Content-Type", mime_type)
                .header("X-Upload-Content-Length", len)
                .json(&metadata),
        )
        .await?;

    let session_uri = session
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DriveError::InvalidResponse("upload session without Location".into()))?
        .to_string();

    let request = client
        .request_url(Method::PUT, &session_uri, token)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, len);

    let request = match body {
        UploadBody::Bytes(bytes) => request.body(bytes),
        UploadBody::File { path, .. } => {
            let file = tokio::fs::File::open(&path).await?;
            request.body(Body::wrap_stream(ReaderStream::new(file)))
        }
    };

    let file: DriveFile = client
        .execute(request)
        .await?
        .json()
        .await
        .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

    info!(name, file_id = %file.id, size = len, "Upload complete");
    file.into_uploaded()
}

// ============================================================================
// Download
// ============================================================================

/// Opens a streaming download of a file's content
///
/// Uses `acknowledgeAbuse=true` so files flagged by Drive's scanners
/// (common for installers) can still be served.
pub async fn download(
    client: &DriveClient,
    token: &str,
    id: &RemoteId,
) -> Result<RemoteDownload, DriveError> {
    let path = format!(
        "{FILES_PATH}/{}?alt=media&acknowledgeAbuse=true",
        id.as_str()
    );
    debug!(file_id = %id, "Opening download stream");

    let response = client
        .execute_with_retry(client.request(Method::GET, &path, token))
        .await?;

    let content_length = response.content_length();
    let stream = response
        .bytes_stream()
        .map_err(|e| RemoteError::OperationFailed(format!("download interrupted: {e}")))
        .boxed();

    Ok(RemoteDownload {
        content_length,
        stream,
    })
}

// ============================================================================
// Metadata operations
// ============================================================================

/// Deletes a file or folder permanently
pub async fn delete(client: &DriveClient, token: &str, id: &RemoteId) -> Result<(), DriveError> {
    let path = format!("{FILES_PATH}/{}", id.as_str());
    client
        .execute_with_retry(client.request(Method::DELETE, &path, token))
        .await?;
    info!(file_id = %id, "Deleted remote file");
    Ok(())
}

/// Grants read access to anyone with the link
pub async fn make_public(
    client: &DriveClient,
    token: &str,
    id: &RemoteId,
) -> Result<(), DriveError> {
    let path = format!("{FILES_PATH}/{}/permissions", id.as_str());
    client
        .execute_with_retry(client.request(Method::POST, &path, token).json(
            &PermissionRequest {
                role: "reader",
                kind: "anyone",
            },
        ))
        .await?;
    debug!(file_id = %id, "Granted public read access");
    Ok(())
}

/// Retrieves metadata for one file or folder
pub async fn get_metadata(
    client: &DriveClient,
    token: &str,
    id: &RemoteId,
) -> Result<RemoteObject, DriveError> {
    let path = format!("{FILES_PATH}/{}?fields={FILE_FIELDS}", id.as_str());
    let file: DriveFile = client
        .execute_with_retry(client.request(Method::GET, &path, token))
        .await?
        .json()
        .await
        .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;
    file.into_remote_object()
}

/// Creates a folder, optionally inside `parent`
pub async fn create_folder(
    client: &DriveClient,
    token: &str,
    name: &str,
    parent: Option<&RemoteId>,
) -> Result<RemoteId, DriveError> {
    let path = format!("{FILES_PATH}?fields=id");
    let body = CreateFileRequest {
        name,
        mime_type: FOLDER_MIME_TYPE,
        parents: parent.map(|p| vec![p.as_str()]).unwrap_or_default(),
    };

    let file: DriveFile = client
        .execute_with_retry(client.request(Method::POST, &path, token).json(&body))
        .await?
        .json()
        .await
        .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

    info!(name, folder_id = %file.id, "Created folder");
    RemoteId::new(file.id).map_err(|e| DriveError::InvalidResponse(e.to_string()))
}

/// Moves a file into `new_parent`, removing it from every other parent
pub async fn move_to_folder(
    client: &DriveClient,
    token: &str,
    id: &RemoteId,
    new_parent: &RemoteId,
) -> Result<(), DriveError> {
    let current = get_metadata(client, token, id).await?;
    let remove: Vec<&str> = current
        .parents
        .iter()
        .filter(|p| *p != new_parent)
        .map(RemoteId::as_str)
        .collect();

    let mut path = format!(
        "{FILES_PATH}/{}?addParents={}&fields=id,parents",
        id.as_str(),
        new_parent.as_str()
    );
    if !remove.is_empty() {
        path.push_str("&removeParents=");
        path.push_str(&remove.join(","));
    }

    client
        .execute_with_retry(
            client
                .request(Method::PATCH, &path, token)
                .json(&serde_json::json!({})),
        )
        .await?;

    info!(file_id = %id, folder_id = %new_parent, "Moved file");
    Ok(())
}

// ============================================================================
// Listings
// ============================================================================

async fn list_page(
    client: &DriveClient,
    token: &str,
    query: &str,
    page_size: u32,
    page_token: Option<&str>,
) -> Result<FilesListResponse, DriveError> {
    let fields = format!("nextPageToken,files({FILE_FIELDS})");
    let page_size = page_size.to_string();
    let mut request = client.request(Method::GET, FILES_PATH, token).query(&[
        ("q", query),
        ("fields", fields.as_str()),
        ("pageSize", page_size.as_str()),
    ]);
    if let Some(page_token) = page_token {
        request = request.query(&[("pageToken", page_token)]);
    }

    client
        .execute_with_retry(request)
        .await?
        .json()
        .await
        .map_err(|e| DriveError::InvalidResponse(e.to_string()))
}

fn into_objects(files: Vec<DriveFile>) -> Vec<RemoteObject> {
    files
        .into_iter()
        .filter_map(|f| f.into_remote_object().ok())
        .collect()
}

/// Lists up to `page_size` non-trashed files visible to the account
pub async fn list_all(
    client: &DriveClient,
    token: &str,
    page_size: u32,
) -> Result<Vec<RemoteObject>, DriveError> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let page = list_page(client, token, "trashed = false", page_size, None).await?;
    debug!(count = page.files.len(), "Listed files");
    Ok(into_objects(page.files))
}

/// Lists every non-trashed direct child of a folder, following pagination
///
/// `None` lists the children of the drive root.
pub async fn list_children(
    client: &DriveClient,
    token: &str,
    parent: Option<&RemoteId>,
) -> Result<Vec<RemoteObject>, DriveError> {
    let parent = parent.map(RemoteId::as_str).unwrap_or("root");
    let query = format!("'{}' in parents and trashed = false", escape_query(parent));

    let mut objects = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = list_page(client, token, &query, MAX_PAGE_SIZE, page_token.as_deref()).await?;
        objects.extend(into_objects(page.files));
        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    debug!(parent, count = objects.len(), "Listed folder children");
    Ok(objects)
}
