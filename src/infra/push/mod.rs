pub mod apns;
pub mod credentials;
pub mod fcm;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::Duration;
use tracing::{info, warn};

use crate::config::push::PushConfig;
use crate::domain::device::Platform;
use crate::domain::notification::{NotificationKind, NotificationPayload};
use crate::infra::clock::Clock;

use apns::{ApnsClient, ApnsTokenSigner};
use credentials::{CredentialCache, ServiceAccountTokenSource};
use fcm::FcmClient;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The provider says the token will never work again.
    #[error("push token rejected ({status}): {reason}")]
    InvalidToken { status: u16, reason: String },
    #[error("push provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("push transport failed: {0}")]
    Transport(String),
    #[error("push credentials unavailable: {0}")]
    Credentials(String),
    #[error("failed to encode push request: {0}")]
    Encode(String),
}

impl PushError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::InvalidToken { .. })
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPriority {
    High,
    Normal,
}

impl PushPriority {
    /// Cross-device actions must cancel stale alerts quickly, other background
    /// wake-ups go out at the battery-friendly priority.
    pub fn for_silent(kind: &NotificationKind) -> Self {
        if kind.is_cross_device_action() {
            PushPriority::High
        } else {
            PushPriority::Normal
        }
    }
}

#[async_trait::async_trait]
pub trait PushClient: Send + Sync {
    /// User-visible notification.
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<(), PushError>;
    /// Data-only background wake-up.
    async fn send_silent(&self, token: &str, kind: &NotificationKind) -> Result<(), PushError>;
}

/// Configured platform clients. A missing client means that platform is not
/// set up for this deployment.
#[derive(Clone, Default)]
pub struct PushClients {
    pub apns: Option<Arc<dyn PushClient>>,
    pub fcm: Option<Arc<dyn PushClient>>,
}

impl PushClients {
    pub fn for_platform(&self, platform: Platform) -> Option<&Arc<dyn PushClient>> {
        match platform {
            Platform::Ios => self.apns.as_ref(),
            Platform::Android => self.fcm.as_ref(),
        }
    }

    /// Builds the configured clients. APNs gets its own HTTP/2 client; FCM
    /// and the OAuth exchange share a regular one.
    pub fn from_config(
        config: &PushConfig,
        timeout: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PushError> {
        let apns = match &config.apns {
            Some(apns) => {
                let signer = ApnsTokenSigner::new(&apns.private_key, &apns.key_id, &apns.team_id)?;
                let credentials = Arc::new(CredentialCache::new(
                    Arc::new(signer),
                    Duration::minutes(10),
                    clock.clone(),
                ));
                info!(endpoint = %apns.endpoint, topic = %apns.bundle_id, "apns configured");
                Some(Arc::new(ApnsClient::new(
                    apns::http_client(timeout)?,
                    apns.endpoint.clone(),
                    apns.bundle_id.clone(),
                    credentials,
                )) as Arc<dyn PushClient>)
            }
            None => {
                warn!("apns not configured, ios devices will not receive pushes");
                None
            }
        };

        let fcm = match &config.fcm {
            Some(fcm) => {
                let http = reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(timeout)
                    .build()?;
                let source = ServiceAccountTokenSource::new(http.clone(), fcm.service_account.clone())?;
                let credentials = Arc::new(CredentialCache::new(
                    Arc::new(source),
                    Duration::minutes(1),
                    clock,
                ));
                info!(project_id = %fcm.project_id, "fcm configured");
                Some(Arc::new(FcmClient::new(
                    http,
                    fcm.endpoint.clone(),
                    fcm.project_id.clone(),
                    credentials,
                )) as Arc<dyn PushClient>)
            }
            None => {
                warn!("fcm not configured, android devices will not receive pushes");
                None
            }
        };

        Ok(Self { apns, fcm })
    }
}

/// Short stable digest of a push token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
