//! Drive service facade: authorize, then delegate to a fresh client.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use drivekit_common::{FileId, Result};

use crate::client::{ContentStream, DriveClient, DriveEntry};
use crate::config::{DriveConfig, DriveEndpoints};
use crate::consent::{Authenticator, LoopbackAuthenticator};
use crate::handle::AuthorizationHandle;
use crate::manager::CredentialManager;

/// Google Drive convenience service.
///
/// Every operation authorizes on its own (re-reading the token file or
/// running the consent flow) and builds a new [`DriveClient`]. Nothing is
/// shared between calls besides the token file.
pub struct DriveService<A = LoopbackAuthenticator> {
    credentials: CredentialManager<A>,
    endpoints: DriveEndpoints,
}

impl DriveService<LoopbackAuthenticator> {
    /// Create a service that falls back to browser consent.
    pub fn new(config: DriveConfig) -> Self {
        Self::with_authenticator(config, LoopbackAuthenticator::new())
    }
}

impl<A: Authenticator> DriveService<A> {
    /// Create a service with a custom fallback authenticator.
    pub fn with_authenticator(config: DriveConfig, authenticator: A) -> Self {
        Self {
            credentials: CredentialManager::with_authenticator(&config, authenticator),
            endpoints: config.endpoints,
        }
    }

    /// The credential manager behind this service.
    pub fn credentials(&self) -> &CredentialManager<A> {
        &self.credentials
    }

    /// Produce an authorization handle without calling the API.
    pub async fn authorize(&self) -> Result<AuthorizationHandle> {
        self.credentials.authorize().await
    }

    /// Delete the stored credential.
    pub async fn forget(&self) -> Result<bool> {
        self.credentials.forget().await
    }

    async fn client(&self) -> Result<DriveClient> {
        let handle = self.credentials.authorize().await?;
        DriveClient::new(Arc::new(handle), self.endpoints.clone())
    }

    /// Download the content of a file.
    pub async fn read_file(&self, file_id: &FileId) -> Result<Bytes> {
        self.client().await?.read_file(file_id).await
    }

    /// Download the content of a file as a stream.
    pub async fn read_file_stream(&self, file_id: &FileId) -> Result<ContentStream> {
        self.client().await?.read_file_stream(file_id).await
    }

    /// Upload a local file into `parent`; returns the new file's ID.
    pub async fn upload_file(&self, path: impl AsRef<Path>, parent: &FileId) -> Result<FileId> {
        self.client().await?.upload_file(path.as_ref(), parent).await
    }

    /// List the children of a folder.
    pub async fn list_files(&self, folder_id: &FileId) -> Result<Vec<DriveEntry>> {
        self.client().await?.list_files(folder_id).await
    }

    /// Create a folder inside `parent`; returns the new folder's ID.
    pub async fn create_folder(&self, name: &str, parent: &FileId) -> Result<FileId> {
        self.client().await?.create_folder(name, parent).await
    }
}
