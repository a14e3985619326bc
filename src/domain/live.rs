use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::reminder::Reminder;
use crate::domain::reminder_list::ReminderList;
use crate::domain::sync_event::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// Pushed to connected clients. A hint to re-sync, not the authoritative stream.
#[derive(Debug, Clone, Serialize)]
pub struct LiveEvent {
    pub action: ChangeAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<ReminderList>,
    pub device_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LiveEvent {
    /// Deletions carry only the id.
    pub fn for_reminder(
        action: ChangeAction,
        reminder: &Reminder,
        device_id: Option<Uuid>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            action,
            entity_type: EntityType::Reminder,
            entity_id: reminder.id,
            reminder: (action != ChangeAction::Deleted).then(|| reminder.clone()),
            list: None,
            device_id,
            timestamp,
        }
    }

    pub fn for_list(
        action: ChangeAction,
        list: &ReminderList,
        device_id: Option<Uuid>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            action,
            entity_type: EntityType::ReminderList,
            entity_id: list.id,
            reminder: None,
            list: (action != ChangeAction::Deleted).then(|| list.clone()),
            device_id,
            timestamp,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match (self.entity_type, self.action) {
            (EntityType::Reminder, ChangeAction::Created) => "reminder_created",
            (EntityType::Reminder, ChangeAction::Updated) => "reminder_updated",
            (EntityType::Reminder, ChangeAction::Deleted) => "reminder_deleted",
            (EntityType::ReminderList, ChangeAction::Created) => "list_created",
            (EntityType::ReminderList, ChangeAction::Updated) => "list_updated",
            (EntityType::ReminderList, ChangeAction::Deleted) => "list_deleted",
        }
    }
}
