//! Interactive OAuth2 consent flow for desktop users.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::path::Path;
use tracing::{info, warn};
use url::Url;

use drivekit_common::{Error, Result};

use crate::callback::CallbackServer;
use crate::credential::StoredCredential;
use crate::handle::{expiry_from, oauth_http_client, AuthorizationHandle};
use crate::keyfile::ClientKeyfile;

/// Full read/write access to the user's Drive.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Source of fresh authorization when no stored credential is usable.
///
/// Implementations may block on a human for as long as they need.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a new handle using the client registration in `keyfile`.
    ///
    /// # Postconditions
    /// - The returned handle carries a non-empty refresh token
    ///
    /// # Errors
    /// - `Error::Configuration` for an unusable keyfile
    /// - `Error::Authentication` if consent or the code exchange fails
    async fn authenticate(&self, keyfile: &Path, scopes: &[String]) -> Result<AuthorizationHandle>;
}

/// Browser consent with a loopback redirect, for installed applications.
///
/// Opens the authorization URL in the default browser, waits for Google to
/// redirect back to a listener on `localhost`, then exchanges the code.
#[derive(Debug, Clone)]
pub struct LoopbackAuthenticator {
    open_browser: bool,
}

impl LoopbackAuthenticator {
    /// Create an authenticator that opens the system browser.
    pub fn new() -> Self {
        Self { open_browser: true }
    }

    /// Only log the authorization URL (headless hosts).
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Run the consent flow, handing the authorization URL to `on_url`
    /// instead of presenting it.
    pub async fn authenticate_with<F>(
        &self,
        keyfile: &Path,
        scopes: &[String],
        on_url: F,
    ) -> Result<AuthorizationHandle>
    where
        F: FnOnce(&Url) + Send,
    {
        let keyfile = ClientKeyfile::load(keyfile).await?;
        let server = CallbackServer::bind(&keyfile.loopback_redirect()?).await?;

        let client = BasicClient::new(ClientId::new(keyfile.client_id.clone()))
            .set_client_secret(ClientSecret::new(keyfile.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(
                AuthUrl::new(keyfile.auth_uri.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(keyfile.token_uri.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(server.redirect_uri().to_string())
                    .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        on_url(&auth_url);

        let code = server.wait_for_code(csrf_token.secret()).await?;

        let http = oauth_http_client()?;
        let token_result = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let refresh_token = token_result
            .refresh_token()
            .ok_or_else(|| {
                Error::Authentication("No refresh token received. Ensure 'offline' access and 'consent' prompt were requested.".to_string())
            })?
            .secret()
            .clone();

        info!(client_id = %keyfile.client_id, "Interactive authentication complete");

        let credential = StoredCredential::authorized_user(
            keyfile.client_id.clone(),
            keyfile.client_secret.clone(),
            refresh_token,
        );

        Ok(AuthorizationHandle::from_credential(credential, keyfile.token_uri.clone())?
            .with_access_token(
                token_result.access_token().secret().clone(),
                expiry_from(token_result.expires_in()),
            ))
    }

    fn present(&self, auth_url: &Url) {
        info!(url = %auth_url, "Authorize this application by visiting the URL");

        if self.open_browser {
            if let Err(e) = open::that(auth_url.as_str()) {
                warn!(error = %e, "Could not open a browser; visit the URL manually");
            }
        }
    }
}

impl Default for LoopbackAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for LoopbackAuthenticator {
    async fn authenticate(&self, keyfile: &Path, scopes: &[String]) -> Result<AuthorizationHandle> {
        self.authenticate_with(keyfile, scopes, |url| self.present(url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_keyfile_is_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = LoopbackAuthenticator::new()
            .without_browser()
            .authenticate(&dir.path().join("client_secret.json"), &[DRIVE_SCOPE.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_non_loopback_redirect_is_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client_secret.json");
        std::fs::write(
            &path,
            r#"{"web": {"client_id": "a", "client_secret": "b", "redirect_uris": ["https://example.com/cb"]}}"#,
        )
        .unwrap();

        let err = LoopbackAuthenticator::new()
            .without_browser()
            .authenticate(&path, &[DRIVE_SCOPE.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    fn write_keyfile(dir: &Path, server: &mockito::ServerGuard) -> std::path::PathBuf {
        let path = dir.join("client_secret.json");
        let doc = serde_json::json!({
            "installed": {
                "client_id": "cid",
                "client_secret": "csecret",
                "auth_uri": format!("{}/auth", server.url()),
                "token_uri": format!("{}/token", server.url()),
                "redirect_uris": ["http://localhost"]
            }
        });
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    /// Play the browser: follow the consent URL straight to the redirect.
    fn approve(auth_url: &Url) {
        let pairs: std::collections::HashMap<String, String> =
            auth_url.query_pairs().into_owned().collect();

        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["scope"], DRIVE_SCOPE);

        let callback = Url::parse_with_params(
            &pairs["redirect_uri"],
            &[("code", "auth-code"), ("state", pairs["state"].as_str())],
        )
        .unwrap();
        tokio::spawn(async move { reqwest::get(callback).await });
    }

    #[tokio::test]
    async fn test_consent_exchanges_code_with_pkce() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                mockito::Matcher::UrlEncoded("code".into(), "auth-code".into()),
                mockito::Matcher::UrlEncoded("client_id".into(), "cid".into()),
                mockito::Matcher::Regex("code_verifier=".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at-1","refresh_token":"rt-1","token_type":"Bearer","expires_in":3600}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let keyfile = write_keyfile(dir.path(), &server);

        let handle = LoopbackAuthenticator::new()
            .without_browser()
            .authenticate_with(&keyfile, &[DRIVE_SCOPE.to_string()], approve)
            .await
            .unwrap();

        assert_eq!(handle.client_id(), "cid");
        assert_eq!(handle.credential().client_secret, "csecret");
        assert_eq!(handle.credential().refresh_token, "rt-1");
        // Seeded from the exchange, so no refresh request is made.
        assert_eq!(handle.access_token().await.unwrap(), "at-1");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_consent_without_refresh_token_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at-1","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;
        let keyfile = write_keyfile(dir.path(), &server);

        let err = LoopbackAuthenticator::new()
            .without_browser()
            .authenticate_with(&keyfile, &[DRIVE_SCOPE.to_string()], approve)
            .await
            .unwrap_err();

        match err {
            Error::Authentication(msg) => assert!(msg.contains("No refresh token")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_authentication_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let keyfile = write_keyfile(dir.path(), &server);

        let err = LoopbackAuthenticator::new()
            .without_browser()
            .authenticate_with(&keyfile, &[DRIVE_SCOPE.to_string()], approve)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
