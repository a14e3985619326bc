use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::credentials::CredentialCache;
use super::{token_fingerprint, PushClient, PushError, PushPriority};
use crate::domain::notification::{NotificationKind, NotificationPayload, ALARM_CATEGORY};

pub const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
const ANDROID_CHANNEL_ID: &str = "reminders";

#[derive(Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<Notification<'a>>,
    data: BTreeMap<String, String>,
    android: AndroidConfig<'a>,
}

#[derive(Serialize)]
struct Notification<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Serialize)]
struct AndroidConfig<'a> {
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<AndroidNotification<'a>>,
}

#[derive(Serialize)]
struct AndroidNotification<'a> {
    channel_id: &'static str,
    sound: &'a str,
    notification_priority: &'static str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// FCM HTTP v1 client.
pub struct FcmClient {
    http: reqwest::Client,
    send_url: String,
    credentials: Arc<CredentialCache>,
}

impl FcmClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        project_id: String,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            base_url.trim_end_matches('/'),
            project_id
        );
        Self {
            http,
            send_url,
            credentials,
        }
    }

    async fn post(&self, token: &str, request: &SendRequest<'_>) -> Result<(), PushError> {
        let bearer = self.credentials.get_token().await?;
        let body =
            serde_json::to_vec(request).map_err(|err| PushError::Encode(err.to_string()))?;

        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(bearer)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            debug!(token = %token_fingerprint(token), "fcm accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if status == 401 {
            self.credentials.invalidate().await;
        }
        let err = classify_error(status, &text);
        debug!(token = %token_fingerprint(token), status, error = %err, "fcm rejected push");
        Err(err)
    }
}

#[async_trait::async_trait]
impl PushClient for FcmClient {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<(), PushError> {
        let request = match &payload.alert {
            Some(_) => alert_request(token, payload),
            None => silent_request(token, &payload.kind),
        };
        self.post(token, &request).await
    }

    async fn send_silent(&self, token: &str, kind: &NotificationKind) -> Result<(), PushError> {
        self.post(token, &silent_request(token, kind)).await
    }
}

fn alert_request<'a>(token: &'a str, payload: &'a NotificationPayload) -> SendRequest<'a> {
    let (notification, android_notification) = match &payload.alert {
        Some(alert) => {
            let is_alarm = alert.category.as_deref() == Some(ALARM_CATEGORY);
            (
                Some(Notification {
                    title: &alert.title,
                    body: alert.body.as_deref(),
                }),
                Some(AndroidNotification {
                    channel_id: ANDROID_CHANNEL_ID,
                    sound: &alert.sound,
                    notification_priority: if is_alarm {
                        "PRIORITY_MAX"
                    } else {
                        "PRIORITY_HIGH"
                    },
                }),
            )
        }
        None => (None, None),
    };

    SendRequest {
        message: Message {
            token,
            notification,
            data: payload.data(),
            android: AndroidConfig {
                priority: "high",
                notification: android_notification,
            },
        },
    }
}

fn silent_request<'a>(token: &'a str, kind: &NotificationKind) -> SendRequest<'a> {
    SendRequest {
        message: Message {
            token,
            notification: None,
            data: kind.to_data(),
            android: AndroidConfig {
                priority: match PushPriority::for_silent(kind) {
                    PushPriority::High => "high",
                    PushPriority::Normal => "normal",
                },
                notification: None,
            },
        },
    }
}

fn classify_error(status: u16, body: &str) -> PushError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let unregistered = parsed.as_ref().map_or(false, |envelope| {
        envelope.error.status == "NOT_FOUND"
            || envelope
                .error
                .details
                .iter()
                .any(|detail| detail.error_code.as_deref() == Some("UNREGISTERED"))
    });
    let bad_token = parsed.as_ref().map_or(false, |envelope| {
        envelope.error.status == "INVALID_ARGUMENT"
            && envelope.error.message.to_lowercase().contains("registration token")
    });

    if status == 404 || unregistered || (status == 400 && bad_token) {
        let reason = parsed
            .map(|envelope| envelope.error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "UNREGISTERED".to_string());
        PushError::InvalidToken { status, reason }
    } else {
        PushError::Rejected {
            status,
            body: body.to_string(),
        }
    }
}
