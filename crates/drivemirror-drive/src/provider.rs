//! GoogleDriveStorage - IRemoteStorage implementation for the Drive v3 API
//!
//! Thin adapter that delegates each port method to the matching function in
//! [`crate::files`] and maps [`DriveError`](crate::DriveError) into the
//! port-level [`RemoteError`].

use async_trait::async_trait;
use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{
    IRemoteStorage, RemoteDownload, RemoteError, RemoteObject, UploadBody, UploadedObject,
};
use tracing::instrument;

use crate::{client::DriveClient, files};

/// Public download endpoint for files shared with "anyone"
const PUBLIC_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id=";

/// Remote storage backed by Google Drive
#[derive(Debug, Clone)]
pub struct GoogleDriveStorage {
    client: DriveClient,
}

impl GoogleDriveStorage {
    /// Creates a new GoogleDriveStorage wrapping the given client
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client
    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait]
impl IRemoteStorage for GoogleDriveStorage {
    #[instrument(skip(self, token, body), fields(size = body.len()))]
    async fn upload(
        &self,
        token: &str,
        body: UploadBody,
        name: &str,
        mime_type: &str,
        parent: Option<&RemoteId>,
    ) -> Result<UploadedObject, RemoteError> {
        Ok(files::upload_resumable(&self.client, token, body, name, mime_type, parent).await?)
    }

    #[instrument(skip(self, token))]
    async fn download(&self, token: &str, id: &RemoteId) -> Result<RemoteDownload, RemoteError> {
        Ok(files::download(&self.client, token, id).await?)
    }

    #[instrument(skip(self, token))]
    async fn delete(&self, token: &str, id: &RemoteId) -> Result<(), RemoteError> {
        Ok(files::delete(&self.client, token, id).await?)
    }

    #[instrument(skip(self, token))]
    async fn make_public(&self, token: &str, id: &RemoteId) -> Result<(), RemoteError> {
        Ok(files::make_public(&self.client, token, id).await?)
    }

    #[instrument(skip(self, token))]
    async fn list_all(
        &self,
        token: &str,
        page_size: u32,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        Ok(files::list_all(&self.client, token, page_size).await?)
    }

    #[instrument(skip(self, token))]
    async fn list_children(
        &self,
        token: &str,
        parent: Option<&RemoteId>,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        Ok(files::list_children(&self.client, token, parent).await?)
    }

    #[instrument(skip(self, token))]
    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&RemoteId>,
    ) -> Result<RemoteId, RemoteError> {
        Ok(files::create_folder(&self.client, token, name, parent).await?)
    }

    #[instrument(skip(self, token))]
    async fn move_to_folder(
        &self,
        token: &str,
        id: &RemoteId,
        new_parent: &RemoteId,
    ) -> Result<(), RemoteError> {
        Ok(files::move_to_folder(&self.client, token, id, new_parent).await?)
    }

    #[instrument(skip(self, token))]
    async fn get_metadata(
        &self,
        token: &str,
        id: &RemoteId,
    ) -> Result<RemoteObject, RemoteError> {
        Ok(files::get_metadata(&self.client, token, id).await?)
    }

    fn public_url(&self, id: &RemoteId) -> String {
        format!("{PUBLIC_DOWNLOAD_URL}{}", id.as_str())
    }
}
