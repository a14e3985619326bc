mod inmemory;
mod postgres;

pub use inmemory::InMemoryReminderRepo;
pub use postgres::PostgresReminderRepo;

use anyhow::Result;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::reminder::{Reminder, ReminderStatus};

#[async_trait::async_trait]
pub trait ReminderRepo: Send + Sync {
    async fn insert(&self, reminder: &Reminder) -> Result<()>;
    async fn find(&self, user_id: Uuid, reminder_id: Uuid) -> Result<Option<Reminder>>;
    async fn find_by_local_id(&self, user_id: Uuid, local_id: &str) -> Result<Option<Reminder>>;
    async fn list(&self, user_id: Uuid, status: Option<ReminderStatus>) -> Result<Vec<Reminder>>;
    async fn list_in_list(&self, user_id: Uuid, list_id: Uuid) -> Result<Vec<Reminder>>;
    /// Active or snoozed reminders per list, for lists holding at least one.
    async fn open_counts_by_list(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>>;
    /// Writes the reminder if the stored version still equals `expected_version`.
    /// `notification_sent_at` is only written when `rearm` is set, in which case
    /// it is cleared; otherwise the stored value wins so a concurrent scanner
    /// claim is never undone.
    async fn update(&self, reminder: &Reminder, expected_version: i32, rearm: bool) -> Result<bool>;
    async fn soft_delete(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
        device_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Reminder>>;
    /// Active, dated, due and not yet notified.
    async fn find_due_for_notification(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Reminder>>;
    /// Claims the notification for the occurrence due at `due_at`. Succeeds
    /// only while the reminder is still active, not deleted, unclaimed and due
    /// at exactly that time, and returns the row as it stood at the claim.
    async fn claim_notification(
        &self,
        reminder_id: Uuid,
        due_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<Option<Reminder>>;
    /// Undoes a claim on the `due_at` occurrence. A reminder rescheduled since
    /// the claim is left alone.
    async fn release_notification(&self, reminder_id: Uuid, due_at: OffsetDateTime) -> Result<()>;
}
