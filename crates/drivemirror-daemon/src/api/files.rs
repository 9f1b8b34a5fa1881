//! File endpoints: listing, upload, delete and download

use std::io::ErrorKind;
use std::path::Path;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use drivemirror_core::domain::{AccountId, Category, FileRecord, FileRecordId};
use drivemirror_core::ports::RecordFilter;
use drivemirror_sync::download::Resolution;
use drivemirror_sync::replication::ReplicaContent;
use drivemirror_sync::upload::NewUpload;
use drivemirror_sync::SyncError;

use super::{ApiError, ApiResult, AppState};

/// Account that served a download
pub const SERVED_BY_HEADER: HeaderName = HeaderName::from_static("x-served-by");
/// Present when a sibling copy served the download
pub const FALLBACK_HEADER: HeaderName = HeaderName::from_static("x-fallback");

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub account_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<FileRecord>>> {
    let mut filter = RecordFilter::new();
    if let Some(category) = non_empty(query.category) {
        filter = filter.with_category(category.parse::<Category>()?);
    }
    if let Some(account_id) = non_empty(query.account_id) {
        filter = filter.with_account_id(account_id.parse::<AccountId>()?);
    }
    Ok(Json(state.services.records.list(&filter).await?))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub record: FileRecord,
    /// True when replication to the secondary accounts was started
    pub replicating: bool,
}

#[derive(Default)]
struct UploadForm {
    file: Option<StagedFile>,
    title: Option<String>,
    category: Option<String>,
    description: Option<String>,
    version: Option<String>,
    account_id: Option<String>,
}

struct StagedFile {
    name: String,
    mime_type: String,
    path: TempPath,
    len: u64,
}

/// Multipart upload: `file`, `title`, `category` and optionally
/// `description`, `version` and `account_id`
///
/// The file is spooled to the staging directory and handed to the engine;
/// replication continues in the background after the response is sent.
#[instrument(skip(state, multipart))]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "file" => form.file = Some(stage(field, &state.staging_dir).await?),
            "title" => form.title = Some(field.text().await?),
            "category" => form.category = Some(field.text().await?),
            "description" => form.description = Some(field.text().await?),
            "version" => form.version = Some(field.text().await?),
            "account_id" => form.account_id = Some(field.text().await?),
            other => debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let file = form.file.ok_or_else(|| missing("file"))?;
    let title = non_empty(form.title).ok_or_else(|| missing("title"))?;
    let category = non_empty(form.category)
        .ok_or_else(|| missing("category"))?
        .parse::<Category>()?;
    let account_id = non_empty(form.account_id)
        .map(|id| id.parse::<AccountId>())
        .transpose()?;

    info!(file = %file.name, bytes = file.len, %category, "Upload received");

    let result = state
        .services
        .uploads
        .upload(NewUpload {
            title,
            description: non_empty(form.description),
            version: non_empty(form.version),
            category,
            original_name: file.name,
            mime_type: file.mime_type,
            account_id,
            content: ReplicaContent::staged(file.path, file.len),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            record: result.record,
            replicating: result.replication.is_some(),
        }),
    ))
}

/// Writes the file part to a temporary file in `dir`
async fn stage(mut field: Field<'_>, dir: &Path) -> ApiResult<StagedFile> {
    let name = field
        .file_name()
        .map(base_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("The file part has no file name".to_string()))?;
    let mime_type = field
        .content_type()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();

    tokio::fs::create_dir_all(dir).await?;
    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut len = 0u64;
    while let Some(chunk) = field.chunk().await? {
        len += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(file = %name, bytes = len, path = %path.display(), "Upload staged");
    Ok(StagedFile {
        name,
        mime_type,
        path,
        len,
    })
}

#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<StatusCode> {
    let id = id.parse::<FileRecordId>()?;
    state.services.records.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the file, or redirects to its public link when no account can
/// serve it
#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Response> {
    let id = id.parse::<FileRecordId>()?;

    match state.services.downloads.resolve(&id).await? {
        Resolution::Local {
            path,
            file_name,
            mime_type,
        } => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(record_id = %id, path = %path.display(), "Local file missing");
                    return Err(SyncError::FileNotFound(id).into());
                }
                Err(e) => return Err(e.into()),
            };
            let len = file.metadata().await.ok().map(|m| m.len());
            Ok(file_response(
                &file_name,
                &mime_type,
                len,
                Body::from_stream(ReaderStream::new(file)),
            ))
        }
        Resolution::Stream {
            download,
            file_name,
            mime_type,
            served_by,
            fallback,
        } => {
            let mut response = file_response(
                &file_name,
                &mime_type,
                download.content_length,
                Body::from_stream(download.stream),
            );
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&served_by.to_string()) {
                headers.insert(SERVED_BY_HEADER, value);
            }
            if fallback {
                headers.insert(FALLBACK_HEADER, HeaderValue::from_static("true"));
            }
            Ok(response)
        }
        Resolution::Redirect { url } => Ok(Redirect::temporary(&url).into_response()),
    }
}

fn file_response(file_name: &str, mime_type: &str, len: Option<u64>, body: Body) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE)),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(file_name));
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    (headers, body).into_response()
}

/// `attachment` disposition with an ASCII-only quoted file name
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Last path component of a client-supplied file name
fn base_name(name: &str) -> String {
    name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name).trim().to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest(format!("Missing form field: {field}"))
}
