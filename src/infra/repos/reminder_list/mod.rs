mod inmemory;
mod postgres;

pub use inmemory::InMemoryReminderListRepo;
pub use postgres::PostgresReminderListRepo;

use anyhow::Result;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::reminder_list::ReminderList;

#[async_trait::async_trait]
pub trait ReminderListRepo: Send + Sync {
    async fn insert(&self, list: &ReminderList) -> Result<()>;
    /// Inserts the user's default list unless one already exists. Returns
    /// whether this call created it.
    async fn insert_default(&self, list: &ReminderList) -> Result<bool>;
    async fn find(&self, user_id: Uuid, list_id: Uuid) -> Result<Option<ReminderList>>;
    async fn find_default(&self, user_id: Uuid) -> Result<Option<ReminderList>>;
    /// Live lists ordered by `sort_order`, then creation.
    async fn list(&self, user_id: Uuid) -> Result<Vec<ReminderList>>;
    async fn count(&self, user_id: Uuid) -> Result<i64>;
    async fn update(&self, list: &ReminderList) -> Result<bool>;
    /// Never removes the default list.
    async fn soft_delete(&self, user_id: Uuid, list_id: Uuid, now: OffsetDateTime) -> Result<Option<ReminderList>>;
}
