#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use rappel::domain::device::{Device, DeviceRegistration, Platform};
use rappel::domain::notification::{Alert, NotificationKind, NotificationPayload};
use rappel::domain::reminder::{NewReminder, Reminder};
use rappel::infra::clock::Clock;
use rappel::infra::push::{PushClient, PushClients, PushError};
use rappel::infra::repos::{DeviceRepo, InMemoryDeviceRepo, Repos};
use rappel::{AppState, StateOptions};

// 32 bytes, test only
pub const TEST_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
pub const TEST_CRON_SECRET: &str = "test-cron-secret";

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Push client double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentPush {
    pub platform: Platform,
    pub token: String,
    pub silent: bool,
    pub kind: NotificationKind,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    InvalidToken,
    Transient,
}

/// Records every send. Tokens can be told to fail permanently or transiently.
pub struct RecordingPushClient {
    platform: Platform,
    sent: Mutex<Vec<SentPush>>,
    failures: Mutex<HashMap<String, Failure>>,
    delay: Mutex<Option<StdDuration>>,
}

impl RecordingPushClient {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_token(&self, token: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(token.to_string(), failure);
    }

    pub fn heal_token(&self, token: &str) {
        self.failures.lock().unwrap().remove(token);
    }

    pub fn set_delay(&self, delay: Option<StdDuration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<SentPush> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    async fn record(
        &self,
        token: &str,
        silent: bool,
        kind: &NotificationKind,
        alert: Option<Alert>,
    ) -> Result<(), PushError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get(token).copied();
        match failure {
            Some(Failure::InvalidToken) => Err(PushError::InvalidToken {
                status: 410,
                reason: "Unregistered".into(),
            }),
            Some(Failure::Transient) => Err(PushError::Rejected {
                status: 503,
                body: "unavailable".into(),
            }),
            None => {
                self.sent.lock().unwrap().push(SentPush {
                    platform: self.platform,
                    token: token.to_string(),
                    silent,
                    kind: kind.clone(),
                    alert,
                });
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl PushClient for RecordingPushClient {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<(), PushError> {
        self.record(token, false, &payload.kind, payload.alert.clone())
            .await
    }

    async fn send_silent(&self, token: &str, kind: &NotificationKind) -> Result<(), PushError> {
        self.record(token, true, kind, None).await
    }
}

// ---------------------------------------------------------------------------
// TestApp: in-memory state, one per test
// ---------------------------------------------------------------------------

pub fn test_options() -> StateOptions {
    StateOptions {
        access_key: TEST_ACCESS_KEY,
        access_ttl_minutes: 60,
        cron_secret: Some(TEST_CRON_SECRET.to_string()),
        live_buffer: 8,
        background_concurrency: 16,
        push_timeout: StdDuration::from_secs(10),
        job_timeout: StdDuration::from_secs(25),
        device_stale_days: 14,
        sync_retention_days: 30,
    }
}

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub apns: Arc<RecordingPushClient>,
    pub fcm: Arc<RecordingPushClient>,
    /// Same store as `state.repos.devices`, for seeding rows registration would reject.
    pub device_store: Arc<InMemoryDeviceRepo>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(test_options())
    }

    pub fn with_options(options: StateOptions) -> Self {
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let apns = Arc::new(RecordingPushClient::new(Platform::Ios));
        let fcm = Arc::new(RecordingPushClient::new(Platform::Android));
        let push = PushClients {
            apns: Some(apns.clone() as Arc<dyn PushClient>),
            fcm: Some(fcm.clone() as Arc<dyn PushClient>),
        };

        let device_store = Arc::new(InMemoryDeviceRepo::new());
        let mut repos = Repos::create_inmemory();
        repos.devices = device_store.clone() as Arc<dyn DeviceRepo>;
        let state = AppState::new(repos, clock.clone(), push, options);
        let router = rappel::http::router(state.clone());

        Self {
            router,
            state,
            clock,
            apns,
            fcm,
            device_store,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Waits for every fire-and-forget push to finish.
    pub async fn settle(&self) {
        tokio::time::timeout(StdDuration::from_secs(5), self.state.tasks.wait_idle())
            .await
            .expect("background tasks did not settle");
    }

    pub fn pushes(&self) -> Vec<SentPush> {
        let mut all = self.apns.sent();
        all.extend(self.fcm.sent());
        all
    }

    pub fn clear_pushes(&self) {
        self.apns.clear();
        self.fcm.clear();
    }

    pub fn token_for(&self, user_id: Uuid, device_id: Option<Uuid>) -> String {
        self.state
            .auth
            .issue_access_token(user_id, device_id)
            .expect("failed to issue token")
            .token
    }

    pub async fn register_device(
        &self,
        user_id: Uuid,
        identifier: &str,
        platform: Platform,
        push_token: &str,
    ) -> Device {
        self.state
            .devices
            .register(DeviceRegistration {
                user_id,
                device_identifier: identifier.to_string(),
                platform,
                push_token: push_token.to_string(),
                device_name: None,
                app_version: None,
                os_version: None,
            })
            .await
            .expect("device registration failed")
    }

    /// Inserts a reminder straight into the store, bypassing sync and pushes.
    pub async fn seed_reminder(&self, user_id: Uuid, title: &str, due_at: Option<OffsetDateTime>) -> Reminder {
        let reminder = Reminder::new(
            user_id,
            NewReminder {
                title: title.to_string(),
                due_at,
                ..Default::default()
            },
            None,
            self.now(),
        );
        self.state
            .repos
            .reminders
            .insert(&reminder)
            .await
            .expect("insert failed");
        reminder
    }

    // ------------------------------------------------------------------
    // HTTP helpers
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    async fn with_token(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let auth;
        let mut headers = vec![];
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(method, path, body, &headers).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.with_token(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.with_token(Method::POST, path, Some(body), token).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.with_token(Method::POST, path, None, token).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.with_token(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.with_token(Method::DELETE, path, None, token).await
    }
}
