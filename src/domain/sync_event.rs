use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Reminder,
    ReminderList,
}

impl EntityType {
    pub fn as_db(&self) -> &'static str {
        match self {
            EntityType::Reminder => "reminder",
            EntityType::ReminderList => "reminder_list",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "reminder" => Some(EntityType::Reminder),
            "reminder_list" => Some(EntityType::ReminderList),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_db(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "create" => Some(SyncAction::Create),
            "update" => Some(SyncAction::Update),
            "delete" => Some(SyncAction::Delete),
            _ => None,
        }
    }
}

/// Immutable record of one entity mutation, ordered per user by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: SyncAction,
    pub payload: Value,
    /// Device that originated the change, lets clients drop their own echo
    pub device_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSyncEvent {
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: SyncAction,
    pub payload: Value,
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ChangePage {
    pub events: Vec<SyncEvent>,
    pub has_more: bool,
}

impl ChangePage {
    /// Builds a page from a `limit + 1` fetch.
    pub fn from_overfetch(mut events: Vec<SyncEvent>, limit: usize) -> Self {
        let has_more = events.len() > limit;
        events.truncate(limit);
        Self { events, has_more }
    }

    /// Cursor to resume from, only present while more events remain.
    pub fn next_cursor(&self) -> Option<OffsetDateTime> {
        if !self.has_more {
            return None;
        }
        self.events.last().map(|event| event.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn events(n: usize) -> Vec<SyncEvent> {
        let base = OffsetDateTime::now_utc();
        (0..n)
            .map(|i| SyncEvent {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                entity_type: EntityType::Reminder,
                entity_id: Uuid::new_v4(),
                action: SyncAction::Update,
                payload: Value::Null,
                device_id: None,
                created_at: base + Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn overfetch_sets_has_more() {
        let page = ChangePage::from_overfetch(events(4), 3);
        assert_eq!(page.events.len(), 3);
        assert!(page.has_more);
        assert_eq!(page.next_cursor(), Some(page.events[2].created_at));
    }

    #[test]
    fn exact_fetch_has_no_more() {
        let page = ChangePage::from_overfetch(events(3), 3);
        assert_eq!(page.events.len(), 3);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor(), None);
    }
}
