use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_db(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Stable install identifier. A physical device belongs to one user at a time.
    pub device_identifier: String,
    pub platform: Platform,
    #[serde(skip_serializing)]
    pub push_token: String,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    pub user_id: Uuid,
    pub device_identifier: String,
    pub platform: Platform,
    pub push_token: String,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
}

/// One deliverable push destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub device_id: Uuid,
    pub platform: Platform,
    pub token: String,
}

impl From<&Device> for PushTarget {
    fn from(device: &Device) -> Self {
        Self {
            device_id: device.id,
            platform: device.platform,
            token: device.push_token.clone(),
        }
    }
}

/// Keeps the first target for every token so a reinstalled app that left a
/// stale row behind is only notified once.
pub fn dedup_targets(targets: impl IntoIterator<Item = PushTarget>) -> Vec<PushTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.token.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(token: &str) -> PushTarget {
        PushTarget {
            device_id: Uuid::new_v4(),
            platform: Platform::Ios,
            token: token.into(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let first = target("abc");
        let targets = vec![first.clone(), target("def"), target("abc")];
        let deduped = dedup_targets(targets);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], first);
    }

    #[test]
    fn platform_db_roundtrip_rejects_unknown() {
        assert_eq!(Platform::from_db("ios"), Some(Platform::Ios));
        assert_eq!(Platform::from_db("android"), Some(Platform::Android));
        assert_eq!(Platform::from_db("web"), None);
    }
}
