//! In-process authorization handle with automatic access-token refresh.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{AuthType, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use drivekit_common::{Error, Result};

use crate::credential::StoredCredential;

/// Access token with expiration tracking.
#[derive(Clone)]
struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Check if the access token is expired or about to expire.
    fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

/// Capability to make authenticated calls for the lifetime of the process.
///
/// Built either from a [`StoredCredential`] read off disk (no access token
/// yet) or by the interactive flow (access token already known). Access
/// tokens are minted from the refresh token on first use and refreshed when
/// they approach expiry.
pub struct AuthorizationHandle {
    credential: StoredCredential,
    token_url: String,
    http: oauth2::reqwest::Client,
    access: RwLock<Option<AccessToken>>,
}

impl AuthorizationHandle {
    /// Create a handle from stored refresh material.
    ///
    /// # Errors
    /// - The credential fails validation
    /// - The HTTP client cannot be built
    pub fn from_credential(
        credential: StoredCredential,
        token_url: impl Into<String>,
    ) -> Result<Self> {
        credential.validate()?;

        Ok(Self {
            credential,
            token_url: token_url.into(),
            http: oauth_http_client()?,
            access: RwLock::new(None),
        })
    }

    /// Seed the handle with an access token that is already known.
    pub fn with_access_token(mut self, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        self.access = RwLock::new(Some(AccessToken {
            secret: token.into(),
            expires_at,
        }));
        self
    }

    /// OAuth2 client ID this handle acts as.
    pub fn client_id(&self) -> &str {
        &self.credential.client_id
    }

    /// The refresh material behind this handle.
    pub fn credential(&self) -> &StoredCredential {
        &self.credential
    }

    /// Copy out the distilled form for persistence.
    pub fn to_stored(&self) -> StoredCredential {
        self.credential.clone()
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// # Errors
    /// - `Error::Authentication` if the token endpoint rejects the refresh
    ///   token (revoked or stale credential)
    pub async fn access_token(&self) -> Result<String> {
        let access = self.access.read().await;

        if let Some(token) = access.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.secret.clone());
        }

        drop(access);

        let mut access = self.access.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = access.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.secret.clone());
        }

        let refreshed = self.refresh().await?;
        let secret = refreshed.secret.clone();
        *access = Some(refreshed);

        Ok(secret)
    }

    /// Value for the `Authorization` header.
    pub async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.access_token().await?))
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(self.credential.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.credential.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        debug!(client_id = %self.credential.client_id, "Refreshing access token");

        let token_result = client
            .exchange_refresh_token(&RefreshToken::new(self.credential.refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        info!("Obtained access token from refresh token");

        Ok(AccessToken {
            secret: token_result.access_token().secret().clone(),
            expires_at: expiry_from(token_result.expires_in()),
        })
    }
}

impl fmt::Debug for AuthorizationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHandle")
            .field("client_id", &self.credential.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// HTTP client for OAuth2 token requests.
///
/// Redirects are disabled so a token endpoint cannot bounce credentials
/// elsewhere.
pub(crate) fn oauth_http_client() -> Result<oauth2::reqwest::Client> {
    oauth2::reqwest::ClientBuilder::new()
        .redirect(oauth2::reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to create OAuth HTTP client: {}", e)))
}

/// Absolute expiry for a token response, defaulting to one hour.
pub(crate) fn expiry_from(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let expires_in = expires_in.unwrap_or_else(|| std::time::Duration::from_secs(3600));
    Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1))
}
