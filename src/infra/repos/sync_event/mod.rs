mod inmemory;
mod postgres;

pub use inmemory::InMemorySyncEventRepo;
pub use postgres::PostgresSyncEventRepo;

use anyhow::Result;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::sync_event::{ChangePage, NewSyncEvent, SyncEvent};

#[async_trait::async_trait]
pub trait SyncEventRepo: Send + Sync {
    /// Appends one event. `created_at` is assigned by the store.
    async fn append(&self, event: &NewSyncEvent) -> Result<SyncEvent>;
    /// Events with `created_at > since`, ascending, at most `limit`.
    async fn changes_since(&self, user_id: Uuid, since: OffsetDateTime, limit: usize) -> Result<ChangePage>;
    async fn delete_older_than(&self, before: OffsetDateTime) -> Result<u64>;
    async fn latest_event_time(&self, user_id: Uuid) -> Result<Option<OffsetDateTime>>;
}
