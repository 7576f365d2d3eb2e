//! OAuth refresh-token credentials for the upload API.
//!
//! Secrets are read once at startup and only ever leave this module as a
//! short-lived access token inside an [`AuthorizedClient`].

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

pub const REFRESH_TOKEN_VAR: &str = "YOUTUBE_REFRESH_TOKEN";
pub const CLIENT_ID_VAR: &str = "YOUTUBE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "YOUTUBE_CLIENT_SECRET";

#[derive(Clone)]
pub struct OAuthCredentials {
    refresh_token: String,
    client_id: String,
    client_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuthCredentials {
    pub fn new(refresh_token: String, client_id: String, client_secret: String) -> Self {
        Self {
            refresh_token,
            client_id,
            client_secret,
        }
    }

    /// Read all three values; the first one missing or empty is reported.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(PipelineError::MissingCredential(name))
        };
        Ok(Self {
            refresh_token: read(REFRESH_TOKEN_VAR)?,
            client_id: read(CLIENT_ID_VAR)?,
            client_secret: read(CLIENT_SECRET_VAR)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// HTTP client paired with a fresh bearer token.
pub struct AuthorizedClient {
    pub client: Client,
    access_token: String,
}

impl AuthorizedClient {
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.access_token)
    }
}

/// Exchanges the stored refresh token for access tokens.
pub struct CredentialProvider {
    credentials: OAuthCredentials,
    token_uri: String,
    client: Client,
}

impl CredentialProvider {
    pub fn new(credentials: OAuthCredentials) -> Result<Self> {
        Self::with_token_uri(credentials, GOOGLE_TOKEN_URI)
    }

    pub fn with_token_uri(credentials: OAuthCredentials, token_uri: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            credentials,
            token_uri: token_uri.into(),
            client,
        })
    }

    pub async fn authorized_client(&self) -> Result<AuthorizedClient> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| PipelineError::Auth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Auth(format!(
                "token endpoint returned {}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Auth(format!("invalid token response: {}", e)))?;
        debug!("Obtained access token, expires in {:?}s", token.expires_in);

        Ok(AuthorizedClient {
            client: self.client.clone(),
            access_token: token.access_token,
        })
    }
}
