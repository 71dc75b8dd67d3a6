//! Access tokens for the Drive API.
//!
//! Tokens come from one of three places: a service account (JWT bearer
//! grant, cached until shortly before expiry), a [`Credential`] issued to a
//! staff user by the external sign-in service, or a fixed token. Stored
//! credentials are never refreshed here; an expired one is an error.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::{Credential, ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google Drive API scope.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

#[derive(Clone)]
enum TokenSource {
    ServiceAccount {
        credentials: Arc<ServiceAccountCredentials>,
        client: Client,
        cached_token: Arc<RwLock<Option<CachedToken>>>,
    },
    Stored(Arc<Credential>),
    Static(String),
}

/// Supplies bearer tokens for Drive requests.
#[derive(Clone)]
pub struct Authenticator {
    source: TokenSource,
}

impl Authenticator {
    /// Create a new authenticator from a service account JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    /// Create a new authenticator from service account credentials.
    pub fn new(credentials: ServiceAccountCredentials) -> Self {
        Self {
            source: TokenSource::ServiceAccount {
                credentials: Arc::new(credentials),
                client: Client::new(),
                cached_token: Arc::new(RwLock::new(None)),
            },
        }
    }

    /// Use a staff user's stored credential.
    pub fn from_credential(credential: Credential) -> Self {
        Self {
            source: TokenSource::Stored(Arc::new(credential)),
        }
    }

    /// Always hand out `token`.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        match &self.source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Stored(credential) => {
                if credential.is_expired(Utc::now()) {
                    return Err(DriveError::AuthenticationError(format!(
                        "credential for {} expired at {}; sign in again",
                        credential.user_id, credential.expires_at
                    )));
                }
                Ok(credential.access_token.clone())
            }
            TokenSource::ServiceAccount {
                credentials,
                client,
                cached_token,
            } => {
                // Check if we have a valid cached token
                {
                    let cached = cached_token.read().await;
                    if let Some(token) = cached.as_ref() {
                        // Add 60 second buffer before expiration
                        let buffer = Duration::from_secs(60);
                        if token.expires_at > SystemTime::now() + buffer {
                            return Ok(token.access_token.clone());
                        }
                    }
                }

                let new_token = refresh_token(client, credentials).await?;
                {
                    let mut cached = cached_token.write().await;
                    *cached = Some(new_token.clone());
                }
                Ok(new_token.access_token)
            }
        }
    }
}

/// Exchange a signed JWT assertion for an access token.
async fn refresh_token(
    client: &Client,
    credentials: &ServiceAccountCredentials,
) -> Result<CachedToken> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| DriveError::TokenRefreshError(e.to_string()))?
        .as_secs();
    let token_uri = credentials.token_uri.as_deref().unwrap_or(TOKEN_URI);

    let claims = Claims {
        iss: credentials.client_email.clone(),
        scope: DRIVE_SCOPE.to_string(),
        aud: token_uri.to_string(),
        iat: now,
        exp: now + 3600, // 1 hour
    };

    let header = Header::new(Algorithm::RS256);
    let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
    let jwt = encode(&header, &claims, &key)?;

    let params = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", &jwt),
    ];

    debug!(issuer = %credentials.client_email, "requesting service account token");
    let response = client.post(token_uri).form(&params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DriveError::TokenRefreshError(format!(
            "Status {}: {}",
            status, body
        )));
    }

    let token_response: TokenResponse = response.json().await?;
    let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);

    Ok(CachedToken {
        access_token: token_response.access_token,
        expires_at,
    })
}
