//! Credential acquisition: stored token first, interactive consent second.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use drivekit_common::{Error, Result};

use crate::config::DriveConfig;
use crate::consent::{Authenticator, LoopbackAuthenticator};
use crate::credential::TokenFile;
use crate::handle::AuthorizationHandle;

/// Produces authorization handles, minimizing interactive authentication.
///
/// Every [`authorize`](Self::authorize) call re-reads the token file; handles
/// are never cached in memory. When the token is missing or unusable the
/// configured [`Authenticator`] runs and its result overwrites the token file.
pub struct CredentialManager<A = LoopbackAuthenticator> {
    token_file: TokenFile,
    credentials_path: Option<PathBuf>,
    scopes: Vec<String>,
    token_url: String,
    authenticator: A,
    /// Serializes authenticate-and-persist so concurrent callers on one
    /// manager run the consent flow at most once.
    flight: Mutex<()>,
}

impl CredentialManager<LoopbackAuthenticator> {
    /// Create a manager using browser consent for the fallback path.
    pub fn new(config: &DriveConfig) -> Self {
        Self::with_authenticator(config, LoopbackAuthenticator::new())
    }
}

impl<A: Authenticator> CredentialManager<A> {
    /// Create a manager with a custom fallback authenticator.
    pub fn with_authenticator(config: &DriveConfig, authenticator: A) -> Self {
        Self {
            token_file: TokenFile::new(config.token_path.clone()),
            credentials_path: config.credentials_path.clone(),
            scopes: config.scopes.clone(),
            token_url: config.endpoints.token_url.clone(),
            authenticator,
            flight: Mutex::new(()),
        }
    }

    /// Path of the token file.
    pub fn token_path(&self) -> &Path {
        self.token_file.path()
    }

    /// Produce a usable authorization handle.
    ///
    /// # Postconditions
    /// - A well-formed stored credential is always used when present
    /// - Otherwise at most one interactive authentication runs, and its
    ///   result overwrites the token file before returning
    ///
    /// # Errors
    /// - `Error::Configuration` if no usable token exists and no credentials
    ///   keyfile is configured; no file is written
    /// - `Error::Authentication` if the interactive flow fails
    /// - `Error::Io` if the new token cannot be persisted
    pub async fn authorize(&self) -> Result<AuthorizationHandle> {
        if let Some(handle) = self.load_stored().await {
            return Ok(handle);
        }

        let keyfile = self.credentials_path.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "No usable token at {} and no credentials keyfile configured",
                self.token_file.path().display()
            ))
        })?;

        let _flight = self.flight.lock().await;

        // Another caller may have finished authenticating while we waited.
        if let Some(handle) = self.load_stored().await {
            return Ok(handle);
        }

        info!(keyfile = %keyfile.display(), "Starting interactive authentication");

        let handle = self.authenticator.authenticate(keyfile, &self.scopes).await?;

        self.token_file.store(&handle.to_stored()).await?;
        info!(path = %self.token_file.path().display(), "Stored credential");

        Ok(handle)
    }

    /// Delete the stored credential so the next call re-authenticates.
    ///
    /// Returns whether a token file existed.
    pub async fn forget(&self) -> Result<bool> {
        let _flight = self.flight.lock().await;
        let removed = self.token_file.remove().await?;
        if removed {
            info!(path = %self.token_file.path().display(), "Removed stored credential");
        }
        Ok(removed)
    }

    async fn load_stored(&self) -> Option<AuthorizationHandle> {
        let path = self.token_file.path();

        let credential = match self.token_file.load().await {
            Ok(credential) => credential,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored credential");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unusable token file");
                return None;
            }
        };

        match AuthorizationHandle::from_credential(credential, self.token_url.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot build handle from stored credential");
                None
            }
        }
    }
}
