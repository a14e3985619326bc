use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub const REMINDER_CATEGORY: &str = "REMINDER_ACTIONS";
pub const ALARM_CATEGORY: &str = "ALARM_ACTIONS";
pub const DEFAULT_SOUND: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDeviceAction {
    Snooze,
    Complete,
    Dismiss,
    Delete,
}

impl CrossDeviceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossDeviceAction::Snooze => "snooze",
            CrossDeviceAction::Complete => "complete",
            CrossDeviceAction::Dismiss => "dismiss",
            CrossDeviceAction::Delete => "delete",
        }
    }
}

/// What a push is about. Each variant carries only the fields its `type` needs;
/// the loose string map is produced by [`NotificationKind::to_data`] at the
/// platform client boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    ReminderDue {
        reminder_id: Uuid,
        due_at: Option<OffsetDateTime>,
        sound_id: Option<String>,
        notes: Option<String>,
    },
    AlarmDue {
        reminder_id: Uuid,
        due_at: Option<OffsetDateTime>,
        sound_id: Option<String>,
        notes: Option<String>,
    },
    Sync,
    CrossDeviceAction {
        action: CrossDeviceAction,
        entity_id: Uuid,
    },
}

impl NotificationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NotificationKind::ReminderDue { .. } => "reminder_due",
            NotificationKind::AlarmDue { .. } => "alarm_due",
            NotificationKind::Sync => "sync",
            NotificationKind::CrossDeviceAction { .. } => "cross_device_action",
        }
    }

    pub fn is_cross_device_action(&self) -> bool {
        matches!(self, NotificationKind::CrossDeviceAction { .. })
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            NotificationKind::ReminderDue { reminder_id, .. }
            | NotificationKind::AlarmDue { reminder_id, .. } => Some(*reminder_id),
            NotificationKind::CrossDeviceAction { entity_id, .. } => Some(*entity_id),
            NotificationKind::Sync => None,
        }
    }

    /// Flattens the kind into the string map carried next to the alert.
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), self.type_name().to_string());

        match self {
            NotificationKind::ReminderDue {
                reminder_id,
                due_at,
                sound_id,
                notes,
            }
            | NotificationKind::AlarmDue {
                reminder_id,
                due_at,
                sound_id,
                notes,
            } => {
                data.insert("reminder_id".to_string(), reminder_id.to_string());
                data.insert(
                    "is_alarm".to_string(),
                    matches!(self, NotificationKind::AlarmDue { .. }).to_string(),
                );
                if let Some(sound_id) = sound_id {
                    data.insert("sound_id".to_string(), sound_id.clone());
                }
                if let Some(notes) = notes {
                    data.insert("notes".to_string(), notes.clone());
                }
                if let Some(due_at) = due_at.and_then(|due_at| due_at.format(&Rfc3339).ok()) {
                    data.insert("due_at".to_string(), due_at);
                }
            }
            NotificationKind::CrossDeviceAction { action, entity_id } => {
                data.insert("action".to_string(), action.as_str().to_string());
                data.insert("entity_id".to_string(), entity_id.to_string());
                // older clients look up the reminder by this key
                data.insert("reminder_id".to_string(), entity_id.to_string());
            }
            NotificationKind::Sync => {}
        }

        data
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: Option<String>,
    pub sound: String,
    pub badge: Option<u32>,
    pub category: Option<String>,
}

/// Ephemeral push content, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub alert: Option<Alert>,
    pub kind: NotificationKind,
}

impl NotificationPayload {
    pub fn alert(alert: Alert, kind: NotificationKind) -> Self {
        Self {
            alert: Some(alert),
            kind,
        }
    }

    pub fn silent(kind: NotificationKind) -> Self {
        Self { alert: None, kind }
    }

    pub fn is_silent(&self) -> bool {
        self.alert.is_none()
    }

    pub fn data(&self) -> BTreeMap<String, String> {
        self.kind.to_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_device_data_carries_action_and_entity() {
        let entity_id = Uuid::new_v4();
        let data = NotificationKind::CrossDeviceAction {
            action: CrossDeviceAction::Complete,
            entity_id,
        }
        .to_data();

        assert_eq!(data.get("type").map(String::as_str), Some("cross_device_action"));
        assert_eq!(data.get("action").map(String::as_str), Some("complete"));
        assert_eq!(data.get("entity_id"), Some(&entity_id.to_string()));
        assert_eq!(data.get("reminder_id"), Some(&entity_id.to_string()));
    }

    #[test]
    fn alarm_data_flags_alarm() {
        let reminder_id = Uuid::new_v4();
        let data = NotificationKind::AlarmDue {
            reminder_id,
            due_at: None,
            sound_id: Some("chime".into()),
            notes: None,
        }
        .to_data();

        assert_eq!(data.get("type").map(String::as_str), Some("alarm_due"));
        assert_eq!(data.get("is_alarm").map(String::as_str), Some("true"));
        assert_eq!(data.get("sound_id").map(String::as_str), Some("chime"));
        assert!(!data.contains_key("notes"));
        assert!(!data.contains_key("due_at"));
    }

    #[test]
    fn sync_ping_is_type_only() {
        let payload = NotificationPayload::silent(NotificationKind::Sync);
        assert!(payload.is_silent());
        let data = payload.data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("type").map(String::as_str), Some("sync"));
    }
}
