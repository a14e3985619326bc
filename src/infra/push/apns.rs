use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::credentials::{CredentialCache, IssuedToken, TokenSource};
use super::{token_fingerprint, PushClient, PushError, PushPriority};
use crate::domain::notification::{NotificationKind, NotificationPayload};

pub const APNS_PRODUCTION_URL: &str = "https://api.push.apple.com";
pub const APNS_SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// Apple rejects provider tokens older than an hour.
const PROVIDER_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// HTTP client for APNs, which only accepts HTTP/2. rustls offers `h2`
/// through ALPN and prior knowledge keeps the client from falling back.
pub fn http_client(timeout: StdDuration) -> Result<reqwest::Client, PushError> {
    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .http2_prior_knowledge()
        .timeout(timeout)
        .build()?)
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

/// Self-signs ES256 provider tokens from the team's .p8 key.
pub struct ApnsTokenSigner {
    key: EncodingKey,
    key_id: String,
    team_id: String,
}

impl ApnsTokenSigner {
    pub fn new(private_key_pem: &str, key_id: &str, team_id: &str) -> Result<Self, PushError> {
        let key = EncodingKey::from_ec_pem(private_key_pem.as_bytes())
            .map_err(|err| PushError::Credentials(format!("invalid apns key: {}", err)))?;
        Ok(Self {
            key,
            key_id: key_id.to_string(),
            team_id: team_id.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for ApnsTokenSigner {
    async fn issue(&self, now: OffsetDateTime) -> Result<IssuedToken, PushError> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let claims = ProviderClaims {
            iss: &self.team_id,
            iat: now.unix_timestamp(),
        };
        let token = encode(&header, &claims, &self.key)
            .map_err(|err| PushError::Credentials(format!("failed to sign apns token: {}", err)))?;

        Ok(IssuedToken {
            token,
            expires_at: now + Duration::minutes(PROVIDER_TOKEN_LIFETIME_MINUTES),
        })
    }
}

#[derive(Deserialize)]
struct ApnsErrorBody {
    reason: Option<String>,
}

pub struct ApnsClient {
    http: reqwest::Client,
    base_url: String,
    topic: String,
    credentials: Arc<CredentialCache>,
}

impl ApnsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        topic: String,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic,
            credentials,
        }
    }

    async fn post(
        &self,
        token: &str,
        push_type: &str,
        priority: PushPriority,
        body: &Value,
    ) -> Result<(), PushError> {
        let bearer = self.credentials.get_token().await?;
        let url = format!("{}/3/device/{}", self.base_url, token);

        let response = self
            .http
            .post(url)
            .header("authorization", format!("bearer {}", bearer))
            .header("apns-topic", &self.topic)
            .header("apns-push-type", push_type)
            .header("apns-priority", priority_header(priority))
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            debug!(token = %token_fingerprint(token), push_type, "apns accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let err = classify_error(status, &text);
        if is_provider_token_error(&err) {
            // a revoked or stale provider token is useless until re-signed
            self.credentials.invalidate().await;
        }
        debug!(token = %token_fingerprint(token), status, error = %err, "apns rejected push");
        Err(err)
    }
}

#[async_trait::async_trait]
impl PushClient for ApnsClient {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<(), PushError> {
        match payload.alert {
            Some(_) => {
                self.post(token, "alert", PushPriority::High, &alert_body(payload))
                    .await
            }
            None => self.send_silent(token, &payload.kind).await,
        }
    }

    async fn send_silent(&self, token: &str, kind: &NotificationKind) -> Result<(), PushError> {
        self.post(
            token,
            "background",
            PushPriority::for_silent(kind),
            &silent_body(kind),
        )
        .await
    }
}

fn priority_header(priority: PushPriority) -> &'static str {
    match priority {
        PushPriority::High => "10",
        PushPriority::Normal => "5",
    }
}

fn with_custom_data(aps: Value, kind: &NotificationKind) -> Value {
    let mut root = Map::new();
    root.insert("aps".to_string(), aps);
    for (key, value) in kind.to_data() {
        root.insert(key, Value::String(value));
    }
    Value::Object(root)
}

pub(crate) fn alert_body(payload: &NotificationPayload) -> Value {
    let mut aps = Map::new();
    if let Some(alert) = &payload.alert {
        let mut alert_dict = Map::new();
        alert_dict.insert("title".to_string(), json!(alert.title));
        if let Some(body) = &alert.body {
            alert_dict.insert("body".to_string(), json!(body));
        }
        aps.insert("alert".to_string(), Value::Object(alert_dict));
        aps.insert("sound".to_string(), json!(alert.sound));
        if let Some(badge) = alert.badge {
            aps.insert("badge".to_string(), json!(badge));
        }
        if let Some(category) = &alert.category {
            aps.insert("category".to_string(), json!(category));
        }
    }
    // lets the service extension and the app both see the push
    aps.insert("mutable-content".to_string(), json!(1));
    aps.insert("content-available".to_string(), json!(1));
    with_custom_data(Value::Object(aps), &payload.kind)
}

pub(crate) fn silent_body(kind: &NotificationKind) -> Value {
    with_custom_data(json!({ "content-available": 1 }), kind)
}

pub(crate) fn classify_error(status: u16, body: &str) -> PushError {
    let reason = serde_json::from_str::<ApnsErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.reason)
        .unwrap_or_default();

    let invalid_token = status == 410
        || (status == 400
            && matches!(
                reason.as_str(),
                "BadDeviceToken" | "DeviceTokenNotForTopic"
            ));

    if invalid_token {
        PushError::InvalidToken {
            status,
            reason: if reason.is_empty() {
                "Unregistered".to_string()
            } else {
                reason
            },
        }
    } else {
        PushError::Rejected {
            status,
            body: body.to_string(),
        }
    }
}

fn is_provider_token_error(err: &PushError) -> bool {
    match err {
        PushError::Rejected { status: 403, body } => {
            body.contains("ExpiredProviderToken") || body.contains("InvalidProviderToken")
        }
        _ => false,
    }
}
