use anyhow::Result;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::domain::sync_event::{ChangePage, NewSyncEvent, SyncEvent};
use crate::infra::repos::SyncEventRepo;

pub const DEFAULT_CHANGES_LIMIT: usize = 100;
pub const MAX_CHANGES_LIMIT: usize = 500;

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_CHANGES_LIMIT)
        .clamp(1, MAX_CHANGES_LIMIT)
}

/// Append-only per-user change log that disconnected clients replay from.
#[derive(Clone)]
pub struct SyncLog {
    events: Arc<dyn SyncEventRepo>,
}

impl SyncLog {
    pub fn new(events: Arc<dyn SyncEventRepo>) -> Self {
        Self { events }
    }

    pub async fn record(&self, event: NewSyncEvent) -> Result<SyncEvent> {
        self.events.append(&event).await
    }

    /// Appends after an entity write that already succeeded. A failure here
    /// cannot roll that write back, so it is reported at error level and the
    /// caller carries on.
    pub async fn record_or_log(&self, event: NewSyncEvent) -> Option<SyncEvent> {
        match self.events.append(&event).await {
            Ok(recorded) => Some(recorded),
            Err(err) => {
                error!(
                    error = ?err,
                    user_id = %event.user_id,
                    entity_type = event.entity_type.as_db(),
                    entity_id = %event.entity_id,
                    action = event.action.as_db(),
                    "sync event append failed, change is missing from the log"
                );
                None
            }
        }
    }

    /// Events strictly after `since` (the start of time when absent).
    pub async fn changes_since(
        &self,
        user_id: Uuid,
        since: Option<OffsetDateTime>,
        limit: Option<usize>,
    ) -> Result<ChangePage> {
        let since = since.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        self.events
            .changes_since(user_id, since, clamp_limit(limit))
            .await
    }

    pub async fn sweep(&self, older_than: OffsetDateTime) -> Result<u64> {
        self.events.delete_older_than(older_than).await
    }

    pub async fn latest(&self, user_id: Uuid) -> Result<Option<OffsetDateTime>> {
        self.events.latest_event_time(user_id).await
    }
}
