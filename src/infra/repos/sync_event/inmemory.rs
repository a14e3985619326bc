use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::SyncEventRepo;
use crate::domain::sync_event::{ChangePage, NewSyncEvent, SyncEvent};

pub struct InMemorySyncEventRepo {
    events: Mutex<Vec<SyncEvent>>,
}

impl InMemorySyncEventRepo {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SyncEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemorySyncEventRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SyncEventRepo for InMemorySyncEventRepo {
    async fn append(&self, event: &NewSyncEvent) -> Result<SyncEvent> {
        let mut events = self.lock();

        // strictly increasing per user at microsecond precision, like timestamptz
        let mut created_at = OffsetDateTime::now_utc();
        let latest = events
            .iter()
            .filter(|e| e.user_id == event.user_id)
            .map(|e| e.created_at)
            .max();
        if let Some(latest) = latest {
            if created_at <= latest {
                created_at = latest + Duration::microseconds(1);
            }
        }

        let stored = SyncEvent {
            id: Uuid::new_v4(),
            user_id: event.user_id,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            action: event.action,
            payload: event.payload.clone(),
            device_id: event.device_id,
            created_at,
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn changes_since(&self, user_id: Uuid, since: OffsetDateTime, limit: usize) -> Result<ChangePage> {
        let mut events: Vec<SyncEvent> = self
            .lock()
            .iter()
            .filter(|e| e.user_id == user_id && e.created_at > since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        events.truncate(limit + 1);
        Ok(ChangePage::from_overfetch(events, limit))
    }

    async fn delete_older_than(&self, before: OffsetDateTime) -> Result<u64> {
        let mut events = self.lock();
        let count = events.len();
        events.retain(|e| e.created_at >= before);
        Ok((count - events.len()) as u64)
    }

    async fn latest_event_time(&self, user_id: Uuid) -> Result<Option<OffsetDateTime>> {
        Ok(self
            .lock()
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.created_at)
            .max())
    }
}
