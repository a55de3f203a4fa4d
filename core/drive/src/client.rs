//! Google Drive API client.

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use drivekit_common::{Error, FileId, Operation, Result};

use crate::config::DriveEndpoints;
use crate::handle::AuthorizationHandle;
use crate::mime::{mime_for_path, FOLDER_MIME_TYPE};

/// Byte stream of downloaded file content.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A child of a folder, as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEntry {
    /// File ID.
    pub id: FileId,
    /// File name.
    pub name: String,
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Response from creating a file or folder with `fields=id`.
#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: FileId,
}

/// Google Drive API client bound to one authorization handle.
pub struct DriveClient {
    http: Client,
    handle: Arc<AuthorizationHandle>,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(handle: Arc<AuthorizationHandle>, endpoints: DriveEndpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivekit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            handle,
            endpoints,
        })
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        self.handle.bearer().await
    }

    /// Download file content.
    pub async fn read_file(&self, file_id: &FileId) -> Result<Bytes> {
        let response = self.get_media(file_id).await?;

        response
            .bytes()
            .await
            .map_err(|e| Error::transport(Operation::ReadFile, e.to_string()))
    }

    /// Download file content as a stream.
    pub async fn read_file_stream(&self, file_id: &FileId) -> Result<ContentStream> {
        let response = self.get_media(file_id).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::transport(Operation::ReadFile, e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn get_media(&self, file_id: &FileId) -> Result<Response> {
        let url = format!("{}/files/{}", self.endpoints.api_base, file_id);
        let auth = self.auth_header().await?;

        debug!(file_id = %file_id, "Downloading file");

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::transport(Operation::ReadFile, e.to_string()))?;

        check(Operation::ReadFile, response).await
    }

    /// Upload a local file into `parent`.
    ///
    /// The file is named after its basename and typed by extension. Content
    /// is streamed from disk inside a `multipart/related` body.
    pub async fn upload_file(&self, path: &Path, parent: &FileId) -> Result<FileId> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Cannot derive a file name from {}", path.display()))
            })?;
        let mime_type = mime_for_path(path);

        let file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();

        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent.as_str()]
        });

        let boundary = format!("drivekit-{}", Uuid::new_v4().simple());
        let head = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            meta = metadata,
            mime = mime_type
        );
        let tail = format!("\r\n--{}--\r\n", boundary);
        let content_length = head.len() as u64 + file_len + tail.len() as u64;

        let body = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(head)) })
            .chain(ReaderStream::new(file))
            .chain(stream::once(async move { Ok(Bytes::from(tail)) }));

        let url = format!("{}/files", self.endpoints.upload_base);
        let auth = self.auth_header().await?;

        debug!(file_name = name, mime_type, parent = %parent, bytes = file_len, "Uploading file");

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .header(header::CONTENT_LENGTH, content_length)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| Error::transport(Operation::UploadFile, e.to_string()))?;

        let created: CreatedFile = parse(Operation::UploadFile, response).await?;
        Ok(created.id)
    }

    /// List the children of a folder, following pagination.
    pub async fn list_files(&self, folder_id: &FileId) -> Result<Vec<DriveEntry>> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        let query = format!("'{}' in parents", escape_query_literal(folder_id.as_str()));

        loop {
            let url = format!("{}/files", self.endpoints.api_base);
            let auth = self.auth_header().await?;

            let mut request = self
                .http
                .get(&url)
                .header(header::AUTHORIZATION, auth)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken, files(id, name)"),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(Operation::ListFiles, e.to_string()))?;

            let page: FileListResponse = parse(Operation::ListFiles, response).await?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(folder_id = %folder_id, count = all_files.len(), "Listed folder");
        Ok(all_files)
    }

    /// Create a folder inside `parent`.
    pub async fn create_folder(&self, name: &str, parent: &FileId) -> Result<FileId> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Folder name cannot be empty".to_string()));
        }

        let url = format!("{}/files", self.endpoints.api_base);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent.as_str()]
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::transport(Operation::CreateFolder, e.to_string()))?;

        let created: CreatedFile = parse(Operation::CreateFolder, response).await?;
        Ok(created.id)
    }
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Pass successful responses through; turn anything else into an upstream
/// error carrying the response body.
async fn check(operation: Operation, response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(Error::upstream(operation, status.as_u16(), body))
    }
}

async fn parse<T: serde::de::DeserializeOwned>(operation: Operation, response: Response) -> Result<T> {
    check(operation, response)
        .await?
        .json()
        .await
        .map_err(|e| Error::transport(operation, format!("Failed to parse response: {}", e)))
}
