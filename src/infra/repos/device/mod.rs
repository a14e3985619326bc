mod inmemory;
mod postgres;

pub use inmemory::InMemoryDeviceRepo;
pub use postgres::PostgresDeviceRepo;

use anyhow::Result;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::device::{Device, DeviceRegistration, PushTarget};

#[async_trait::async_trait]
pub trait DeviceRepo: Send + Sync {
    /// Registers or refreshes a device. An identifier held by another user is
    /// unlinked from that user first, and rows of the same user carrying the
    /// same push token under another identifier are collapsed into this one.
    async fn upsert(&self, registration: &DeviceRegistration, now: OffsetDateTime) -> Result<Device>;
    async fn find(&self, device_id: Uuid) -> Result<Option<Device>>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Device>>;
    async fn delete(&self, user_id: Uuid, device_id: Uuid) -> Result<bool>;
    async fn delete_by_push_token(&self, push_token: &str) -> Result<u64>;
    async fn delete_stale(&self, last_seen_before: OffsetDateTime) -> Result<u64>;
    async fn touch(&self, device_id: Uuid, now: OffsetDateTime) -> Result<()>;
    /// One target per distinct token.
    async fn get_all_push_tokens(&self, user_id: Uuid) -> Result<Vec<PushTarget>>;
    /// Like [`DeviceRepo::get_all_push_tokens`] but without the excluded
    /// device or any row sharing its token.
    async fn get_push_tokens_excluding(&self, user_id: Uuid, device_id: Uuid) -> Result<Vec<PushTarget>>;
}
