use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::PushError;
use crate::infra::clock::Clock;

pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Mints a fresh provider bearer token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue(&self, now: OffsetDateTime) -> Result<IssuedToken, PushError>;
}

/// Holds one bearer token per platform and refreshes it `refresh_margin`
/// before it expires. Nothing is persisted; a restart rebuilds it lazily.
pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    refresh_margin: Duration,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<IssuedToken>>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn TokenSource>, refresh_margin: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            refresh_margin,
            clock,
            cached: RwLock::new(None),
        }
    }

    fn usable<'a>(&self, cached: &'a Option<IssuedToken>, now: OffsetDateTime) -> Option<&'a str> {
        cached
            .as_ref()
            .filter(|token| now < token.expires_at - self.refresh_margin)
            .map(|token| token.token.as_str())
    }

    pub async fn get_token(&self) -> Result<String, PushError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = self.usable(&cached, self.clock.now()) {
                return Ok(token.to_string());
            }
        }

        let mut cached = self.cached.write().await;
        // another caller may have refreshed while we waited for the write lock
        let now = self.clock.now();
        if let Some(token) = self.usable(&cached, now) {
            return Ok(token.to_string());
        }

        let issued = self.source.issue(now).await.map_err(|err| {
            warn!(error = %err, "push credential refresh failed");
            err
        })?;
        debug!(expires_at = %issued.expires_at, "push credential refreshed");
        let token = issued.token.clone();
        *cached = Some(issued);
        Ok(token)
    }

    /// Drops the cached token so the next call re-issues it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

/// Google service account key file contents.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// OAuth2 JWT-bearer exchange for FCM access tokens.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

impl ServiceAccountTokenSource {
    pub fn new(http: reqwest::Client, account: ServiceAccountKey) -> Result<Self, PushError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|err| PushError::Credentials(format!("invalid service account key: {}", err)))?;
        Ok(Self {
            http,
            client_email: account.client_email,
            token_uri: account
                .token_uri
                .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            key,
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn issue(&self, now: OffsetDateTime) -> Result<IssuedToken, PushError> {
        let iat = now.unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: FCM_SCOPE,
            aud: &self.token_uri,
            iat,
            exp: iat + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|err| PushError::Credentials(format!("failed to sign assertion: {}", err)))?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|err| PushError::Credentials(format!("token request failed: {}", err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Credentials(format!(
                "token exchange returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| PushError::Credentials(format!("invalid token response: {}", err)))?;

        Ok(IssuedToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in.unwrap_or(3600)),
        })
    }
}
