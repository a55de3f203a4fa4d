//! OAuth2 client descriptor ("client secret" JSON) for the consent flow.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use url::Url;

use drivekit_common::{Error, Result};

/// OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const DEFAULT_REDIRECT: &str = "http://localhost";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Top-level shape of a downloaded client secret file.
#[derive(Deserialize)]
struct KeyfileDocument {
    installed: Option<ClientKeyfile>,
    web: Option<ClientKeyfile>,
}

/// OAuth2 client registration for a desktop ("installed") or web client.
#[derive(Clone, Deserialize)]
pub struct ClientKeyfile {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientKeyfile {
    /// Read a keyfile from disk.
    ///
    /// # Errors
    /// - `Error::Configuration` if the file is missing or not a client
    ///   secret document
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!(
                "Cannot read credentials keyfile {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&data).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse the JSON content of a keyfile.
    ///
    /// Accepts either an `installed` or a `web` section; `installed` wins if
    /// both are present.
    pub fn parse(json: &str) -> Result<Self> {
        let document: KeyfileDocument = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid keyfile: {}", e)))?;

        let keyfile = document.installed.or(document.web).ok_or_else(|| {
            Error::Configuration(
                "Keyfile must contain an \"installed\" or \"web\" section".to_string(),
            )
        })?;

        if keyfile.client_id.is_empty() {
            return Err(Error::Configuration("Keyfile client_id is empty".to_string()));
        }

        Ok(keyfile)
    }

    /// Redirect URI the loopback listener should serve.
    ///
    /// Uses the first registered redirect URI, or `http://localhost` when none
    /// is registered. The port may be absent, in which case an ephemeral port
    /// is chosen at bind time.
    ///
    /// # Errors
    /// - The URI is not plain `http` on `localhost` / `127.0.0.1`
    pub fn loopback_redirect(&self) -> Result<Url> {
        let raw = self
            .redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT);

        let url = Url::parse(raw)
            .map_err(|e| Error::Configuration(format!("Invalid redirect URI {}: {}", raw, e)))?;

        match (url.scheme(), url.host_str()) {
            ("http", Some("localhost")) | ("http", Some("127.0.0.1")) => Ok(url),
            _ => Err(Error::Configuration(format!(
                "Redirect URI must be an http loopback address, got {}",
                raw
            ))),
        }
    }
}

impl fmt::Debug for ClientKeyfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKeyfile")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("redirect_uris", &self.redirect_uris)
            .finish_non_exhaustive()
    }
}
