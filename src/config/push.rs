use anyhow::{anyhow, Result};
use tracing::warn;
use url::Url;

use super::{env_optional, env_or};
use crate::infra::push::apns::{APNS_PRODUCTION_URL, APNS_SANDBOX_URL};
use crate::infra::push::credentials::ServiceAccountKey;
use crate::infra::push::fcm::FCM_ENDPOINT;

const DEFAULT_BUNDLE_ID: &str = "com.remindme.app";

#[derive(Clone, Debug)]
pub struct ApnsConfig {
    pub key_id: String,
    pub team_id: String,
    pub private_key: String,
    pub bundle_id: String,
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct FcmConfig {
    pub project_id: String,
    pub service_account: ServiceAccountKey,
    pub endpoint: String,
}

/// Both platforms are optional; a deployment may only ship one app.
#[derive(Clone, Debug, Default)]
pub struct PushConfig {
    pub apns: Option<ApnsConfig>,
    pub fcm: Option<FcmConfig>,
}

impl PushConfig {
    pub fn from_env() -> Result<Self> {
        let apns = apns_from_parts(
            env_optional("APNS_KEY_ID"),
            env_optional("APNS_TEAM_ID"),
            env_optional("APNS_PRIVATE_KEY"),
            env_or("APNS_BUNDLE_ID", DEFAULT_BUNDLE_ID),
            env_or("APNS_PRODUCTION", "false") == "true",
            endpoint_override("APNS_ENDPOINT")?,
        );
        let fcm = fcm_from_parts(
            env_optional("FCM_PROJECT_ID"),
            env_optional("FCM_CREDENTIALS_JSON"),
            endpoint_override("FCM_ENDPOINT")?,
        )?;
        Ok(Self { apns, fcm })
    }
}

pub(crate) fn apns_from_parts(
    key_id: Option<String>,
    team_id: Option<String>,
    private_key: Option<String>,
    bundle_id: String,
    production: bool,
    endpoint: Option<String>,
) -> Option<ApnsConfig> {
    match (key_id, team_id, private_key) {
        (Some(key_id), Some(team_id), Some(private_key)) => {
            let endpoint = endpoint.unwrap_or_else(|| {
                if production {
                    APNS_PRODUCTION_URL.to_string()
                } else {
                    APNS_SANDBOX_URL.to_string()
                }
            });
            Some(ApnsConfig {
                key_id,
                team_id,
                private_key: unescape_pem(&private_key),
                bundle_id,
                endpoint,
            })
        }
        (None, None, None) => None,
        _ => {
            warn!("APNS_KEY_ID, APNS_TEAM_ID and APNS_PRIVATE_KEY must all be set; apns disabled");
            None
        }
    }
}

pub(crate) fn fcm_from_parts(
    project_id: Option<String>,
    credentials_json: Option<String>,
    endpoint: Option<String>,
) -> Result<Option<FcmConfig>> {
    match (project_id, credentials_json) {
        (Some(project_id), Some(credentials_json)) => {
            let mut service_account: ServiceAccountKey = serde_json::from_str(&credentials_json)
                .map_err(|err| anyhow!("invalid FCM_CREDENTIALS_JSON: {}", err))?;
            service_account.private_key = unescape_pem(&service_account.private_key);
            Ok(Some(FcmConfig {
                project_id,
                service_account,
                endpoint: endpoint.unwrap_or_else(|| FCM_ENDPOINT.to_string()),
            }))
        }
        (None, None) => Ok(None),
        _ => {
            warn!("FCM_PROJECT_ID and FCM_CREDENTIALS_JSON must both be set; fcm disabled");
            Ok(None)
        }
    }
}

fn endpoint_override(key: &str) -> Result<Option<String>> {
    env_optional(key)
        .map(|value| parse_endpoint(key, &value))
        .transpose()
}

/// Stored without a trailing slash; request paths are appended to it.
pub(crate) fn parse_endpoint(key: &str, value: &str) -> Result<String> {
    let url = Url::parse(value).map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(anyhow!("invalid {}: expected an http(s) base url", key));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// PEM keys pasted into a single-line env var arrive with literal `\n`.
fn unescape_pem(value: &str) -> String {
    value.replace("\\n", "\n")
}
