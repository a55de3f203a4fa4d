//! Persisted OAuth2 refresh material and its on-disk token file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::Zeroize;

use drivekit_common::{Error, Result};

/// Value of the `type` field for user refresh credentials.
pub const AUTHORIZED_USER: &str = "authorized_user";

/// Minimal refresh material written to the token file.
///
/// This is the distilled form of an [`AuthorizationHandle`]: enough to mint
/// new access tokens on later runs without asking the user again.
///
/// [`AuthorizationHandle`]: crate::AuthorizationHandle
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct StoredCredential {
    /// Always `authorized_user`.
    #[serde(rename = "type")]
    pub kind: String,
    /// OAuth2 client ID the refresh token was issued to.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

impl StoredCredential {
    /// Create an `authorized_user` credential.
    pub fn authorized_user(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            kind: AUTHORIZED_USER.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Check that the record can be used to build a handle.
    ///
    /// # Errors
    /// - `type` is not `authorized_user`
    /// - any of the identity or token fields is empty
    pub fn validate(&self) -> Result<()> {
        if self.kind != AUTHORIZED_USER {
            return Err(Error::InvalidInput(format!(
                "Unsupported credential type: {}",
                self.kind
            )));
        }
        for (field, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &self.refresh_token),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidInput(format!("Credential {} is empty", field)));
            }
        }
        Ok(())
    }
}

impl Drop for StoredCredential {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Token file at a fixed path.
///
/// The file is read on every authorization and overwritten wholesale when a
/// new credential is obtained. Nothing is cached in memory.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    /// Create a token file handle. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the stored credential.
    ///
    /// # Errors
    /// - `Error::Io` with `NotFound` if the file does not exist
    /// - `Error::Serialization` if the file is not a credential JSON object
    /// - `Error::InvalidInput` if the credential fails validation
    pub async fn load(&self) -> Result<StoredCredential> {
        let data = tokio::fs::read(&self.path).await?;
        let credential: StoredCredential = serde_json::from_slice(&data)?;
        credential.validate()?;
        debug!(path = %self.path.display(), "Loaded stored credential");
        Ok(credential)
    }

    /// Overwrite the token file with `credential`.
    ///
    /// The JSON is written to a sibling temporary file which is then renamed
    /// over the target, so readers see either the old or the new record.
    /// Parent directories are created as needed. On Unix the file is `0600`.
    pub async fn store(&self, credential: &StoredCredential) -> Result<()> {
        let file_name = self.path.file_name().ok_or_else(|| {
            Error::InvalidInput(format!(
                "Token path has no file name: {}",
                self.path.display()
            ))
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let payload = serde_json::to_vec(credential)?;
        if let Err(e) = write_private(&tmp_path, &payload).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Delete the token file.
    ///
    /// Returns whether a file was removed.
    pub async fn remove(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `data` to a fresh file that is owner-only from creation on.
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
        // A stale temp file keeps its old mode; start from scratch.
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
