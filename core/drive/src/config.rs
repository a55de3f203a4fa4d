//! Construction-time configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use drivekit_common::{Error, Result};

use crate::consent::DRIVE_SCOPE;
use crate::keyfile::GOOGLE_TOKEN_URL;

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Remote endpoints. Overridable so tests can point at a local server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveEndpoints {
    /// Metadata API base URL.
    pub api_base: String,
    /// Media upload API base URL.
    pub upload_base: String,
    /// Token endpoint used to refresh stored credentials.
    pub token_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Point every endpoint at one base URL, as a mock server would serve
    /// them (`{base}/files`, `{base}/upload/files`, `{base}/token`).
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: base.to_string(),
            upload_base: format!("{}/upload", base),
            token_url: format!("{}/token", base),
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec![DRIVE_SCOPE.to_string()]
}

/// Drive service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Where the stored credential lives.
    pub token_path: PathBuf,
    /// OAuth2 client keyfile; only needed when no usable token exists.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Scopes requested during interactive authentication.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Drive and token endpoints; Google's unless overridden.
    #[serde(default)]
    pub endpoints: DriveEndpoints,
}

impl DriveConfig {
    /// Configuration with a token path and defaults for everything else.
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            credentials_path: None,
            scopes: default_scopes(),
            endpoints: DriveEndpoints::default(),
        }
    }

    /// Set the credentials keyfile.
    pub fn with_credentials(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Replace the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Replace the remote endpoints.
    pub fn with_endpoints(mut self, endpoints: DriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// - `Error::Configuration` if the file cannot be read or parsed, or
    ///   requests no scopes
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!("Cannot read config {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&data).map_err(|e| {
            Error::Configuration(format!("Invalid config {}: {}", path.display(), e))
        })?;

        if config.scopes.is_empty() {
            return Err(Error::Configuration(
                "At least one OAuth scope is required".to_string(),
            ));
        }

        Ok(config)
    }

    /// Per-user default token location, e.g. `~/.config/drivekit/token.json`.
    pub fn default_token_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drivekit").join("token.json"))
    }
}
